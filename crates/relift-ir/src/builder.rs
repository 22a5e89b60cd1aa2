//! IR builder fluent API.

use crate::function::Function;
use crate::instr::{BinOp, CastOp, InstKind, Predicate};
use crate::terminator::Terminator;
use crate::types::{BlockId, FuncId, Ty, Value};

/// Appends instructions to one block of a function.
pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
}

impl<'f> FunctionBuilder<'f> {
    /// Create a builder positioned at the end of `block`.
    pub fn new(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block }
    }

    pub const fn block(&self) -> BlockId {
        self.block
    }

    pub fn position_at(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn func(&mut self) -> &mut Function {
        &mut *self.func
    }

    fn push(&mut self, kind: InstKind, ty: Option<Ty>) -> Value {
        Value::Inst(self.func.append_inst(self.block, kind, ty))
    }

    fn ty_of(&self, value: Value) -> Ty {
        self.func.value_ty(value).unwrap_or(Ty::I64)
    }

    pub fn alloca(&mut self, size: u32) -> Value {
        self.push(InstKind::Alloca { size }, Some(Ty::Ptr))
    }

    pub fn load(&mut self, ptr: Value, ty: Ty) -> Value {
        self.push(InstKind::Load { ptr }, Some(ty))
    }

    pub fn store(&mut self, ptr: Value, value: Value) {
        self.push(InstKind::Store { ptr, value }, None);
    }

    /// Binary operation typed after its left operand.
    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.ty_of(lhs);
        self.push(InstKind::Binary { op, lhs, rhs }, Some(ty))
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn and(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn icmp(&mut self, pred: Predicate, lhs: Value, rhs: Value) -> Value {
        self.push(InstKind::Icmp { pred, lhs, rhs }, Some(Ty::I1))
    }

    pub fn cast(&mut self, op: CastOp, value: Value, ty: Ty) -> Value {
        self.push(InstKind::Cast { op, value }, Some(ty))
    }

    pub fn trunc(&mut self, value: Value, ty: Ty) -> Value {
        self.cast(CastOp::Trunc, value, ty)
    }

    pub fn zext(&mut self, value: Value, ty: Ty) -> Value {
        self.cast(CastOp::ZExt, value, ty)
    }

    pub fn int_to_ptr(&mut self, value: Value) -> Value {
        self.cast(CastOp::IntToPtr, value, Ty::Ptr)
    }

    pub fn ptr_to_int(&mut self, value: Value) -> Value {
        self.cast(CastOp::PtrToInt, value, Ty::I64)
    }

    pub fn ptr_add(&mut self, base: Value, offset: Value) -> Value {
        self.push(InstKind::PtrAdd { base, offset }, Some(Ty::Ptr))
    }

    /// Pointer `offset` bytes from `base`.
    pub fn ptr_offset(&mut self, base: Value, offset: i64) -> Value {
        #[allow(clippy::cast_sign_loss)]
        let offset = Value::int(offset as u64, Ty::I64);
        self.ptr_add(base, offset)
    }

    pub fn select(&mut self, cond: Value, if_true: Value, if_false: Value) -> Value {
        let ty = self.ty_of(if_true);
        self.push(
            InstKind::Select {
                cond,
                if_true,
                if_false,
            },
            Some(ty),
        )
    }

    /// Phi node; inserted after any existing phis of the current block.
    pub fn phi(&mut self, ty: Ty, incoming: Vec<(BlockId, Value)>) -> Value {
        let index = self.func.phis(self.block).len();
        Value::Inst(
            self.func
                .insert_inst(self.block, index, InstKind::Phi { incoming }, Some(ty)),
        )
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<Value>, ret: Option<Ty>) -> Option<Value> {
        let value = self.push(InstKind::Call { callee, args }, ret);
        ret.map(|_| value)
    }

    pub fn jump(&mut self, target: BlockId) {
        self.func.set_terminator(self.block, Terminator::Jump(target));
    }

    pub fn branch(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.func.set_terminator(
            self.block,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
    }

    pub fn indirect_jump(&mut self, target: Value) {
        self.func
            .set_terminator(self.block, Terminator::IndirectJump { target });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.func.set_terminator(self.block, Terminator::Return(value));
    }

    pub fn unreachable(&mut self) {
        self.func.set_terminator(self.block, Terminator::Unreachable);
    }
}
