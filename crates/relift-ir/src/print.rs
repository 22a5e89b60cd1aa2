//! Textual dump of functions and modules, used in trace logs and test failures.

use std::fmt;

use crate::function::Function;
use crate::instr::InstKind;
use crate::module::Module;
use crate::terminator::Terminator;

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} %arg{i}", p.ty))
            .collect();
        let ret = self.ret.map_or_else(|| "void".to_string(), |t| t.to_string());
        if self.is_declaration() {
            return writeln!(f, "declare {ret} @{}({})", self.name, params.join(", "));
        }
        writeln!(f, "define {ret} @{}({}) {{", self.name, params.join(", "))?;
        for (id, block) in self.blocks() {
            match block.address {
                Some(addr) => writeln!(f, "{id}:  ; {addr:#x}")?,
                None => writeln!(f, "{id}:")?,
            }
            for &inst in &block.insts {
                let data = self.inst(inst);
                let body = match &data.kind {
                    InstKind::Alloca { size } => format!("alloca {size}"),
                    InstKind::Load { ptr } => format!("load {ptr}"),
                    InstKind::Store { ptr, value } => format!("store {value}, {ptr}"),
                    InstKind::Binary { op, lhs, rhs } => {
                        format!("{} {lhs}, {rhs}", op.mnemonic())
                    }
                    InstKind::Icmp { pred, lhs, rhs } => {
                        format!("icmp {} {lhs}, {rhs}", pred.mnemonic())
                    }
                    InstKind::Cast { op, value } => format!("{} {value}", op.mnemonic()),
                    InstKind::PtrAdd { base, offset } => format!("ptradd {base}, {offset}"),
                    InstKind::Select {
                        cond,
                        if_true,
                        if_false,
                    } => format!("select {cond}, {if_true}, {if_false}"),
                    InstKind::Phi { incoming } => {
                        let arms: Vec<String> = incoming
                            .iter()
                            .map(|(b, v)| format!("[{v}, {b}]"))
                            .collect();
                        format!("phi {}", arms.join(", "))
                    }
                    InstKind::Call { callee, args } => {
                        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                        format!("call {callee}({})", args.join(", "))
                    }
                };
                match data.ty {
                    Some(ty) => writeln!(f, "  {inst}: {ty} = {body}")?,
                    None => writeln!(f, "  {body}")?,
                }
            }
            let term = match &block.terminator {
                Terminator::Jump(target) => format!("br {target}"),
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => format!("br {cond}, {then_block}, {else_block}"),
                Terminator::IndirectJump { target } => format!("indirectbr {target}"),
                Terminator::Return(Some(value)) => format!("ret {value}"),
                Terminator::Return(None) => "ret void".to_string(),
                Terminator::Unreachable => "unreachable".to_string(),
            };
            writeln!(f, "  {term}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (_, func) in self.functions() {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
