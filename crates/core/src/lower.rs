//! Constant-expression lowering.
//!
//! Folded `gep`/`cast` constants buried in operands hide global-variable
//! uses from passes that test `operand == global`. This pre-pass
//! materializes such expressions into real instructions so every global use
//! becomes a direct operand. Phi operands materialize in the incoming block,
//! in front of its terminator, since instructions cannot be inserted before
//! a phi.

use crate::ir::{Const, Function, Inst, Operand, Ty};

/// Whether an operand is a folded constant expression worth materializing.
fn is_const_expr(op: &Operand) -> bool {
    matches!(
        op,
        Operand::Const(Const::Gep { .. }) | Operand::Const(Const::Cast { .. })
    )
}

/// Recursively materialize `c` as instructions appended to `out`, returning
/// the operand that now denotes its value.
fn materialize(func: &mut Function, c: &Const, out: &mut Vec<Inst>) -> Operand {
    match c {
        Const::Gep {
            elem_ty,
            base,
            indices,
        } => {
            let base_op = materialize(func, base, out);
            let dest = func.new_value();
            out.push(Inst::Gep {
                dest,
                elem_ty: elem_ty.clone(),
                base: base_op,
                indices: indices
                    .iter()
                    .map(|&i| {
                        Operand::Const(Const::Int {
                            bits: 64,
                            value: i as u64,
                        })
                    })
                    .collect(),
                inbounds: true,
            });
            Operand::Value(dest)
        }
        Const::Cast { to, val } => {
            let val_op = materialize(func, val, out);
            let dest = func.new_value();
            out.push(Inst::Cast {
                dest,
                to: to.clone(),
                val: val_op,
            });
            Operand::Value(dest)
        }
        other => Operand::Const(other.clone()),
    }
}

/// Rewrite every folded constant-expression operand in `func` into explicit
/// instructions. Returns whether anything changed.
pub fn lower_constant_expr(func: &mut Function) -> bool {
    let mut changed = false;

    // Phi operands first: their replacement instructions belong to the
    // incoming block, which may be any block of the function.
    let labels: Vec<String> = func.blocks.iter().map(|b| b.label.clone()).collect();
    for label in &labels {
        let block_idx = func.block_index(label).expect("snapshot label");
        let mut rewrites: Vec<(usize, usize, Const, String)> = Vec::new();
        for (ii, inst) in func.blocks[block_idx].insts.iter().enumerate() {
            if let Inst::Phi { incoming, .. } = inst {
                for (ei, (op, pred)) in incoming.iter().enumerate() {
                    if is_const_expr(op) {
                        if let Operand::Const(c) = op {
                            rewrites.push((ii, ei, c.clone(), pred.clone()));
                        }
                    }
                }
            }
        }
        for (ii, ei, c, pred) in rewrites {
            let mut lowered = Vec::new();
            let new_op = materialize(func, &c, &mut lowered);
            let pred_idx = func
                .block_index(&pred)
                .expect("phi predecessor must exist");
            func.blocks[pred_idx].insts.extend(lowered);
            if let Inst::Phi { incoming, .. } = &mut func.blocks[block_idx].insts[ii] {
                incoming[ei].0 = new_op;
            }
            changed = true;
        }
    }

    // Straight-line operands: insert ahead of the using instruction.
    for block_idx in 0..func.blocks.len() {
        let mut ii = 0;
        while ii < func.blocks[block_idx].insts.len() {
            if matches!(func.blocks[block_idx].insts[ii], Inst::Phi { .. }) {
                ii += 1;
                continue;
            }
            let mut exprs: Vec<Const> = Vec::new();
            func.blocks[block_idx].insts[ii].for_each_operand(&mut |op| {
                if is_const_expr(op) {
                    if let Operand::Const(c) = op {
                        exprs.push(c.clone());
                    }
                }
            });
            if exprs.is_empty() {
                ii += 1;
                continue;
            }

            let mut lowered = Vec::new();
            let mut replacements: Vec<(Const, Operand)> = Vec::new();
            for c in exprs {
                let new_op = materialize(func, &c, &mut lowered);
                replacements.push((c, new_op));
            }
            func.blocks[block_idx].insts[ii].for_each_operand_mut(&mut |op| {
                if let Operand::Const(c) = op {
                    if let Some((_, new_op)) = replacements.iter().find(|(old, _)| old == c) {
                        *op = new_op.clone();
                    }
                }
            });
            let n = lowered.len();
            for (k, inst) in lowered.into_iter().enumerate() {
                func.blocks[block_idx].insts.insert(ii + k, inst);
            }
            ii += n + 1;
            changed = true;
        }

        // Terminator operands (invoke arguments, indirect targets) land at
        // the end of the block body.
        let mut exprs: Vec<Const> = Vec::new();
        func.blocks[block_idx].term.for_each_operand(&mut |op| {
            if is_const_expr(op) {
                if let Operand::Const(c) = op {
                    exprs.push(c.clone());
                }
            }
        });
        if !exprs.is_empty() {
            let mut lowered = Vec::new();
            let mut replacements: Vec<(Const, Operand)> = Vec::new();
            for c in exprs {
                let new_op = materialize(func, &c, &mut lowered);
                replacements.push((c, new_op));
            }
            func.blocks[block_idx].term.for_each_operand_mut(&mut |op| {
                if let Operand::Const(c) = op {
                    if let Some((_, new_op)) = replacements.iter().find(|(old, _)| old == c) {
                        *op = new_op.clone();
                    }
                }
            });
            func.blocks[block_idx].insts.extend(lowered);
            changed = true;
        }
    }

    changed
}

/// Build the canonical decayed pointer to a global array's first element.
pub fn const_array_decay(global: &str, elem: Ty, len: usize) -> Const {
    Const::Gep {
        elem_ty: Ty::Array(Box::new(elem), len),
        base: Box::new(Const::Global(global.to_string())),
        indices: vec![0, 0],
    }
}
