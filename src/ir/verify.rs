//! Structural verifier and cleanup optimizer.

use std::collections::HashSet;

use crate::ir::instr::{Op, ValKind};
use crate::ir::module::Module;
use crate::ir::ty::Type;

impl Module {
    /// Structural sanity checks over every attached,
    /// defined function. Instructions after a block's
    /// first terminator are dead code (the optimizer
    /// sweeps them) and are not themselves an error; a
    /// block with no terminator at all is.
    pub fn verify(&self) -> Result<(), String> {
        for (id, func) in self.funcs.iter().enumerate() {
            if func.detached || func.is_declaration() {
                continue;
            }
            let fname = self.func_name(id);

            for &block in &func.blocks {
                if !self.block_has_terminator(block) {
                    return Err(format!(
                        "block in function @{} does not end in a terminator",
                        fname,
                    ));
                }

                for &instr in &self.blocks[block].instrs {
                    self.verify_instr(&fname, instr)?;
                }
            }

            for ret_ty in self.ret_types(id) {
                let expected = func.ret_type();
                let actual = ret_ty.unwrap_or(Type::Void);
                if actual != *expected {
                    return Err(format!(
                        "function @{} returns {} but its type says {}",
                        fname, actual, expected,
                    ));
                }
            }
        }
        Ok(())
    }

    fn verify_instr(&self, fname: &str, instr: usize) -> Result<(), String> {
        match self.instrs[instr].op {
            Op::Store { ref val, ref ptr } => {
                match ptr.ty.pointee() {
                    Some(pointee) if *pointee == val.ty => Ok(()),
                    _ => Err(format!(
                        "store of {} through {} in @{}",
                        val.ty, ptr.ty, fname,
                    )),
                }
            }
            Op::Call {
                ref callee,
                ref args,
            } => {
                let (params, vararg) = match callee.ty.pointee() {
                    Some(Type::Func {
                        params, vararg, ..
                    }) => (params, *vararg),
                    _ => {
                        return Err(format!(
                            "call through non-function type {} in @{}",
                            callee.ty, fname,
                        ))
                    }
                };
                if args.len() < params.len() || (!vararg && args.len() != params.len()) {
                    return Err(format!(
                        "call arity mismatch in @{}: expected {}, got {}",
                        fname,
                        params.len(),
                        args.len(),
                    ));
                }
                for (arg, param) in args.iter().zip(params) {
                    if arg.ty != *param {
                        return Err(format!(
                            "call argument of type {} where {} is expected in @{}",
                            arg.ty, param, fname,
                        ));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Cleanup passes. Level 1 drops dead code after
    /// terminators; level 2 additionally sweeps unused
    /// pure instructions; level 3 iterates the sweep to a
    /// fixpoint. `size_level` is accepted for interface
    /// parity and does not change the pass list.
    pub fn optimize(&mut self, level: u8, _size_level: u8) {
        if level == 0 {
            return;
        }

        self.truncate_after_terminators();

        if level >= 2 {
            let mut swept = self.sweep_unused();
            if level >= 3 {
                while swept {
                    swept = self.sweep_unused();
                }
            }
        }
    }

    fn truncate_after_terminators(&mut self) {
        for block in &mut self.blocks {
            if block.detached {
                continue;
            }
            if let Some(stop) = block
                .instrs
                .iter()
                .position(|&i| self.instrs[i].op.is_terminator())
            {
                block.instrs.truncate(stop + 1);
            }
        }
    }

    /// Removes pure instructions whose results no live
    /// instruction references. Returns whether anything
    /// was removed.
    fn sweep_unused(&mut self) -> bool {
        let mut used: HashSet<usize> = HashSet::new();
        for func in &self.funcs {
            if func.detached {
                continue;
            }
            for &block in &func.blocks {
                for &instr in &self.blocks[block].instrs {
                    for val in self.instrs[instr].op.operands() {
                        if let ValKind::Instr(dep) = val.kind {
                            used.insert(dep);
                        }
                    }
                }
            }
        }

        let mut removed = false;
        for func in 0..self.funcs.len() {
            if self.funcs[func].detached {
                continue;
            }
            for bi in 0..self.funcs[func].blocks.len() {
                let block = self.funcs[func].blocks[bi];
                let before = self.blocks[block].instrs.len();
                let instrs: Vec<usize> = self.blocks[block]
                    .instrs
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let pure = matches!(
                            self.instrs[i].op,
                            Op::Binary { .. }
                                | Op::Icmp { .. }
                                | Op::Cast { .. }
                                | Op::Gep { .. }
                                | Op::Load { .. }
                        );
                        !pure || used.contains(&i)
                    })
                    .collect();
                removed |= instrs.len() != before;
                self.blocks[block].instrs = instrs;
            }
        }
        removed
    }
}

impl Op {
    /// Every value the operation reads.
    pub fn operands(&self) -> Vec<&crate::ir::instr::Val> {
        match self {
            Op::Binary { lhs, rhs, .. } | Op::Icmp { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Cast { val, .. } => vec![val],
            Op::Alloca { .. } => vec![],
            Op::Load { ptr } => vec![ptr],
            Op::Store { val, ptr } => vec![val, ptr],
            Op::Gep { base, indices, .. } => {
                let mut all = vec![base];
                all.extend(indices.iter());
                all
            }
            Op::Call { callee, args } => {
                let mut all = vec![callee];
                all.extend(args.iter());
                all
            }
            Op::Br { .. } => vec![],
            Op::CondBr { cond, .. } => vec![cond],
            Op::Ret { val } => val.iter().collect(),
            Op::Phi { incoming } => incoming.iter().map(|(v, _)| v).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::ir::builder::Builder;
    use crate::ir::instr::BinTag;
    use crate::ir::module::Module;
    use crate::ir::ty::Type;

    fn int_func(module: &mut Module, name: &str) -> usize {
        module.add_function(
            Some(name),
            Type::Func {
                params: vec![],
                ret: Box::new(Type::I32),
                vararg: false,
            },
        )
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut module = Module::new("bad");
        let func = int_func(&mut module, "f");
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));
        builder.alloca(&Type::I32, None);

        assert!(builder.finish().verify().is_err());
    }

    #[test]
    fn dead_code_after_ret_is_swept_not_rejected() {
        let mut module = Module::new("dead");
        let func = int_func(&mut module, "f");
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));

        let one = builder.const_i32(1);
        builder.ret(&one);
        let two = builder.const_i32(2);
        builder.binary(BinTag::Add, &two, &two);

        let mut module = builder.finish();
        assert!(module.verify().is_ok());
        module.optimize(1, 0);
        let text = module.print_to_string();
        assert!(!text.contains("add"));
    }

    #[test]
    fn unused_pure_instructions_are_swept() {
        let mut module = Module::new("sweep");
        let func = int_func(&mut module, "f");
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));

        let two = builder.const_i32(2);
        builder.binary(BinTag::Mul, &two, &two); // unused
        let kept = builder.binary(BinTag::Add, &two, &two);
        builder.ret(&kept);

        let mut module = builder.finish();
        module.optimize(2, 0);
        let text = module.print_to_string();
        assert!(!text.contains("mul"));
        assert!(text.contains("add"));
    }
}
