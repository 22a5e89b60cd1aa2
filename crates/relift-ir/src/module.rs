//! Modules: the unit the optimizer works on.

use crate::function::Function;
use crate::types::{FuncId, Value};

/// Handle to one parameter of one function.
///
/// The lifter passes its pseudo-stack and pseudo-memory parameters to the
/// optimizer this way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArgRef {
    pub func: FuncId,
    pub index: u32,
}

impl ArgRef {
    pub const fn new(func: FuncId, index: u32) -> Self {
        Self { func, index }
    }

    pub const fn value(self) -> Value {
        Value::Arg(self.index)
    }
}

/// A collection of functions. Removed functions leave a tombstone so that
/// [`FuncId`] handles held by call instructions stay valid.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    functions: Vec<Option<Function>>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(u32::try_from(self.functions.len()).unwrap_or(u32::MAX));
        self.functions.push(Some(func));
        id
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index()).and_then(Option::as_ref)
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter().enumerate().filter_map(|(i, f)| {
            f.as_ref()
                .map(|f| (FuncId(u32::try_from(i).unwrap_or(u32::MAX)), f))
        })
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = (FuncId, &mut Function)> {
        self.functions.iter_mut().enumerate().filter_map(|(i, f)| {
            f.as_mut()
                .map(|f| (FuncId(u32::try_from(i).unwrap_or(u32::MAX)), f))
        })
    }

    pub fn function_ids(&self) -> Vec<FuncId> {
        self.functions().map(|(id, _)| id).collect()
    }

    pub fn remove_function(&mut self, id: FuncId) -> Option<Function> {
        self.functions.get_mut(id.index()).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.functions.iter().filter(|f| f.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total instruction count over all function bodies.
    pub fn instruction_count(&self) -> usize {
        self.functions().map(|(_, f)| f.instruction_count()).sum()
    }
}
