//! Indirect-branch obfuscation.
//!
//! Replaces every two-way conditional branch with a load from an encrypted,
//! function-local table of block addresses, indexed by a `select` over the
//! branch condition. Table entries are displaced by a random key; the
//! runtime displacement that undoes it is derived from the function's
//! threaded secret, so neither the key nor any plain block address appears
//! as a constant in the rewritten body.

use std::collections::{HashMap, HashSet};

use goron_core::cfg::split_all_critical_edges;
use goron_core::ir::{
    BinOp, Const, Global, Inst, Linkage, Module, Operand, Term, Ty,
};
use goron_core::seed::Prng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::options::ObfuscationOptions;
use crate::{Result, Transform};

/// The per-function conditional-branch rewriting pass.
pub struct IndirectBranch<'a> {
    ipo: Option<&'a crate::ipo::IpoContext>,
    options: &'a ObfuscationOptions,
}

impl<'a> IndirectBranch<'a> {
    pub fn new(
        ipo: Option<&'a crate::ipo::IpoContext>,
        options: &'a ObfuscationOptions,
    ) -> Self {
        Self { ipo, options }
    }

    /// Collect every conditional-branch target once, in discovery order,
    /// then shuffle and assign dense indices.
    fn number_basic_blocks(func: &goron_core::ir::Function, prng: &mut Prng) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for block in &func.blocks {
            if let Term::CondBr {
                on_true, on_false, ..
            } = &block.term
            {
                for succ in [on_true, on_false] {
                    if seen.insert(succ.clone()) {
                        targets.push(succ.clone());
                    }
                }
            }
        }

        let mut engine = prng.fork();
        targets.shuffle(&mut engine);
        targets
    }

    /// The encrypted target table `<func>_IndirectBrTargets`, reused when it
    /// already exists. Each entry is `blockaddress + enc_key` over `i8`, and
    /// the table is pinned against link-time stripping.
    fn get_indirect_targets(
        module: &mut Module,
        func: &str,
        targets: &[String],
        enc_key: u32,
    ) -> String {
        let table_name = format!("{func}_IndirectBrTargets");
        if module.global(&table_name).is_some() {
            return table_name;
        }

        let elems: Vec<Const> = targets
            .iter()
            .map(|block| Const::Gep {
                elem_ty: Ty::i8(),
                base: Box::new(Const::Cast {
                    to: Ty::i8().ptr_to(),
                    val: Box::new(Const::BlockAddr {
                        func: func.to_string(),
                        block: block.clone(),
                    }),
                }),
                indices: vec![(enc_key as i32) as i64],
            })
            .collect();

        let mut table = Global::private_mut(
            table_name.clone(),
            Ty::Array(Box::new(Ty::i8().ptr_to()), elems.len()),
            Const::Array {
                elem: Ty::i8().ptr_to(),
                elems,
            },
        );
        table.align = 8;
        module
            .add_global(table)
            .expect("table name is fresh in this module");
        module.append_to_compiler_used(&[&table_name]);
        table_name
    }

    /// Rewrite one function. Returns the number of branches rewritten.
    pub fn run_on_function(
        &self,
        module: &mut Module,
        name: &str,
        prng: &mut Prng,
    ) -> Result<usize> {
        {
            let Some(func) = module.function(name) else {
                return Ok(0);
            };
            if !self
                .options
                .to_obfuscate(self.options.enable_indirect_branch, func, "indbr")
            {
                return Ok(0);
            }
            if func.is_declaration()
                || func.linkage == Linkage::Linkonce
                || func.section.as_deref() == Some(".text.startup")
            {
                return Ok(0);
            }
        }

        // An indirectbr cannot be the source side of a critical edge, so
        // split them all before enumerating targets: the forwarding blocks
        // may themselves become branch targets.
        let func = module.function_mut(name).expect("checked above");
        split_all_critical_edges(func);

        let targets = Self::number_basic_blocks(func, prng);
        if targets.is_empty() {
            return Ok(0);
        }
        let numbering: HashMap<&str, u32> = targets
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), i as u32))
            .collect();

        // Low two bits cleared to keep displaced addresses word-aligned in
        // the pointer-offset arithmetic; 0x8000_0000 is rerolled because its
        // 32-bit negation does not cancel under sign extension.
        let enc_key = loop {
            let v = prng.next_u32() & !3;
            if v != 0x8000_0000 {
                break v;
            }
        };

        let secret = self.ipo.and_then(|ipo| ipo.get_ipo_info(name));
        let (secret_op, secret_ci) = match secret {
            Some(info) => (Operand::Value(info.secret_li), info.secret_ci),
            None => {
                warn!(
                    func = %name,
                    "no threaded secret available; branch-table key degrades to a constant"
                );
                (Operand::Const(Const::i32(0)), 0)
            }
        };

        let rewrites: Vec<(usize, Operand, String, String)> = {
            let func = module.function(name).expect("checked above");
            func.blocks
                .iter()
                .enumerate()
                .filter_map(|(bi, block)| match &block.term {
                    Term::CondBr {
                        cond,
                        on_true,
                        on_false,
                    } => Some((bi, cond.clone(), on_true.clone(), on_false.clone())),
                    _ => None,
                })
                .collect()
        };

        let table = Self::get_indirect_targets(module, name, &targets, enc_key);
        let table_ty = Ty::Array(Box::new(Ty::i8().ptr_to()), targets.len());
        // X folds the secret against the key; the runtime subtraction
        // `X - secret` reconstructs the table displacement's inverse.
        let fold = secret_ci.wrapping_sub(enc_key);

        let func = module.function_mut(name).expect("checked above");
        for (bi, cond, on_true, on_false) in &rewrites {
            let t_idx = numbering[on_true.as_str()];
            let f_idx = numbering[on_false.as_str()];

            let idx = func.new_value();
            let slot = func.new_value();
            let enc_dest = func.new_named_value("EncDestAddr");
            let dec_key = func.new_named_value("DecKey");
            let dest_addr = func.new_value();

            let block = &mut func.blocks[*bi];
            block.insts.extend([
                Inst::Select {
                    dest: idx,
                    ty: Ty::i32(),
                    cond: cond.clone(),
                    on_true: Operand::Const(Const::i32(t_idx)),
                    on_false: Operand::Const(Const::i32(f_idx)),
                },
                Inst::Gep {
                    dest: slot,
                    elem_ty: table_ty.clone(),
                    base: Operand::Const(Const::Global(table.clone())),
                    indices: vec![
                        Operand::Const(Const::i32(0)),
                        Operand::Value(idx),
                    ],
                    inbounds: false,
                },
                Inst::Load {
                    dest: enc_dest,
                    ty: Ty::i8().ptr_to(),
                    ptr: Operand::Value(slot),
                },
                Inst::Bin {
                    dest: dec_key,
                    op: BinOp::Sub,
                    bits: 32,
                    lhs: Operand::Const(Const::i32(fold)),
                    rhs: secret_op.clone(),
                },
                Inst::Gep {
                    dest: dest_addr,
                    elem_ty: Ty::i8(),
                    base: Operand::Value(enc_dest),
                    indices: vec![Operand::Value(dec_key)],
                    inbounds: false,
                },
            ]);
            block.term = Term::IndirectBr {
                addr: Operand::Value(dest_addr),
                dests: vec![on_true.clone(), on_false.clone()],
            };
        }

        debug!(
            func = %name,
            branches = rewrites.len(),
            targets = targets.len(),
            "rewrote conditional branches through encrypted table"
        );
        Ok(rewrites.len())
    }
}

impl Transform for IndirectBranch<'_> {
    fn name(&self) -> &'static str {
        "IndirectBranch"
    }

    fn apply(&mut self, module: &mut Module, prng: &mut Prng) -> Result<bool> {
        let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let mut rewritten = 0;
        for name in names {
            rewritten += self.run_on_function(module, &name, prng)?;
        }
        Ok(rewritten > 0)
    }
}
