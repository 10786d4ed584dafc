//! Inter-procedural obfuscation context.
//!
//! Injects a per-function 32-bit secret, threaded through call chains:
//! every eligible internal function is rebuilt with a leading secret-pointer
//! parameter, and every caller stores the callee's secret into a scratch
//! slot right before the call — expressed only as a compile-time difference
//! against the caller's own secret, so no callee constant appears verbatim
//! outside its own entry block. Downstream passes fold their constants
//! against `IpoInfo::secret_ci` and rebuild them at run time from
//! `IpoInfo::secret_li`.

use std::collections::HashMap;

use goron_core::ir::{BinOp, Function, Inst, Module, Operand, Param, Term, Ty, ValueId};
use goron_core::seed::Prng;
use tracing::debug;

use crate::{Error, Result, Transform};

/// Per-function secret bookkeeping, established by [`IpoContext::apply`].
#[derive(Debug)]
pub struct IpoInfo {
    /// Stack slot holding the function's own secret constant. Dead and
    /// erased once the secret argument is wired.
    pub caller_slot: ValueId,
    /// Scratch slot where this function writes the secret of its next
    /// callee before each call.
    pub callee_slot: ValueId,
    /// The load materializing this function's secret as an SSA value.
    pub secret_li: ValueId,
    /// The compile-time value of this function's secret.
    pub secret_ci: u32,
}

/// The module-level secret-threading pass and its queryable results.
#[derive(Default)]
pub struct IpoContext {
    infos: HashMap<String, IpoInfo>,
    local_functions: Vec<String>,
    dead_slots: Vec<(String, ValueId)>,
}

impl IpoContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Secret bookkeeping for a function, `None` if it was not seen by the
    /// pass (declarations, or functions added afterwards).
    pub fn get_ipo_info(&self, func: &str) -> Option<&IpoInfo> {
        self.infos.get(func)
    }

    /// Functions that were resignatured with a secret argument.
    pub fn resignatured(&self) -> &[String] {
        &self.local_functions
    }

    /// A function is eligible iff it is module-local, has a body, and its
    /// only uses are as the callee of direct calls: one address-taking use
    /// disqualifies it entirely, since a signature change would break every
    /// escaped pointer.
    fn survey(&mut self, module: &Module) {
        for func in &module.functions {
            if !func.linkage.is_local() || func.is_declaration() {
                continue;
            }
            if module.address_uses_of(&func.name) > 0 {
                debug!(func = %func.name, "address escapes, not resignaturing");
                continue;
            }
            debug!(func = %func.name, "enqueue local function");
            self.local_functions.push(func.name.clone());
        }
    }

    /// Give every body function two secret slots and a loaded secret value
    /// at the top of its entry block.
    fn alloca_secret_slots(&mut self, module: &mut Module, prng: &mut Prng) {
        for func in &mut module.functions {
            if func.is_declaration() {
                continue;
            }
            let secret_ci = prng.next_u32();
            let caller_slot = func.new_named_value("CallerSlot");
            let callee_slot = func.new_named_value("CalleeSlot");
            let secret_li = func.new_named_value("MySecret");

            let prelude = [
                Inst::Alloca {
                    dest: caller_slot,
                    ty: Ty::i32(),
                    align: 4,
                },
                Inst::Alloca {
                    dest: callee_slot,
                    ty: Ty::i32(),
                    align: 4,
                },
                Inst::Store {
                    val: Operand::Const(goron_core::Const::i32(secret_ci)),
                    ptr: Operand::Value(caller_slot),
                },
                Inst::Load {
                    dest: secret_li,
                    ty: Ty::i32(),
                    ptr: Operand::Value(caller_slot),
                },
            ];
            let entry = func.entry_mut().expect("body function has entry block");
            for (at, inst) in prelude.into_iter().enumerate() {
                entry.insts.insert(at, inst);
            }

            self.infos.insert(
                func.name.clone(),
                IpoInfo {
                    caller_slot,
                    callee_slot,
                    secret_li,
                    secret_ci,
                },
            );
        }
    }

    /// Rebuild `name` as a parallel function whose parameter list is
    /// prefixed with `SecretArg: i32*`, splice the body across, then rewrite
    /// every direct call site to pass the caller's scratch slot. The
    /// original function is erased once no use remains.
    fn insert_secret_argument(&mut self, module: &mut Module, name: &str) -> Result<()> {
        if module.address_uses_of(name) > 0 {
            return Err(Error::InvariantViolation {
                pass: "ipo",
                symbol: name.to_string(),
                reason: "non-call use appeared after survey".into(),
            });
        }

        let position = module
            .functions
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| goron_core::Error::UnknownFunction(name.to_string()))
            .map_err(Error::Core)?;
        let mut old = module.functions.remove(position);

        let mut params = Vec::with_capacity(old.params.len() + 1);
        params.push(Param::new("SecretArg", Ty::i32().ptr_to()));
        params.extend(old.params.clone());

        let mut nf = Function::new(name, params, old.ret.clone());
        nf.varargs = old.varargs;
        nf.linkage = old.linkage;
        nf.cconv = old.cconv;
        nf.section = old.section.clone();
        nf.comdat = old.comdat.clone();
        nf.attrs = old.attrs.clone();
        nf.ret_attrs = old.ret_attrs.clone();
        nf.adopt_values_from(&old);
        nf.blocks = std::mem::take(&mut old.blocks);

        // The body now sees its arguments one position later.
        nf.shift_args(1);

        // The entry-block secret load read the now-redundant CallerSlot;
        // re-materialize the secret through the new argument instead.
        let info = self
            .infos
            .get_mut(name)
            .expect("resignatured function has secret info");
        nf.erase_def(info.secret_li);
        let my_secret = nf.new_named_value("MySecret");
        nf.entry_mut()
            .expect("spliced body has entry block")
            .insts
            .insert(
                0,
                Inst::Load {
                    dest: my_secret,
                    ty: Ty::i32(),
                    ptr: Operand::Arg(0),
                },
            );
        info.secret_li = my_secret;
        self.dead_slots.push((name.to_string(), info.caller_slot));

        module.functions.insert(position, nf);
        drop(old);

        // Drain the call sites: each direct call gains the caller's scratch
        // slot as its first argument, attributes shifting one right.
        let sites = module.call_sites_of(name);
        for (fi, bi, ii) in sites {
            let caller = module.functions[fi].name.clone();
            let caller_info = self.infos.get(&caller).ok_or_else(|| {
                Error::InvariantViolation {
                    pass: "ipo",
                    symbol: caller.clone(),
                    reason: format!("call to '{name}' from a function with no secret slot"),
                }
            })?;
            let slot = Operand::Value(caller_info.callee_slot);

            let block = &mut module.functions[fi].blocks[bi];
            if ii < block.insts.len() {
                let Inst::Call { args, attrs, .. } = &mut block.insts[ii] else {
                    return Err(Error::InvariantViolation {
                        pass: "ipo",
                        symbol: name.to_string(),
                        reason: "recorded call site is not a call".into(),
                    });
                };
                args.insert(0, slot);
                attrs.params.insert(0, Vec::new());
            } else {
                let Term::Invoke { args, attrs, .. } = &mut block.term else {
                    return Err(Error::InvariantViolation {
                        pass: "ipo",
                        symbol: name.to_string(),
                        reason: "recorded call site is not an invoke".into(),
                    });
                };
                args.insert(0, slot);
                attrs.params.insert(0, Vec::new());
            }
        }

        debug!(func = %name, "resignatured with secret argument");
        Ok(())
    }

    /// At every call site of `name`, store the callee's secret into the
    /// caller's scratch slot, derived from the caller's live secret:
    /// `calleeSecret = CallerSecretSSA − (CallerCI − CalleeCI)`. At run time
    /// the stored word equals the callee's constant, but the constant a
    /// static reader sees is only the folded difference.
    fn compute_call_site_secret(&self, module: &mut Module, name: &str) -> Result<()> {
        let callee_ci = self
            .infos
            .get(name)
            .expect("resignatured function has secret info")
            .secret_ci;

        let sites = module.call_sites_of(name);
        for (fi, bi, ii) in sites.into_iter().rev() {
            let caller = module.functions[fi].name.clone();
            let caller_info = &self.infos[&caller];
            let diff = caller_info.secret_ci.wrapping_sub(callee_ci);

            let func = &mut module.functions[fi];
            let derived = func.new_value();
            let sub = Inst::Bin {
                dest: derived,
                op: BinOp::Sub,
                bits: 32,
                lhs: Operand::Value(caller_info.secret_li),
                rhs: Operand::Const(goron_core::Const::i32(diff)),
            };
            let store = Inst::Store {
                val: Operand::Value(derived),
                ptr: Operand::Value(caller_info.callee_slot),
            };
            let insts = &mut func.blocks[bi].insts;
            let at = ii.min(insts.len());
            insts.insert(at, sub);
            insts.insert(at + 1, store);
        }
        Ok(())
    }

    /// Erase the `CallerSlot` allocas of resignatured functions along with
    /// their remaining users; the secret now arrives through `SecretArg`.
    fn remove_dead_slots(&self, module: &mut Module) {
        for (fname, slot) in &self.dead_slots {
            if let Some(func) = module.function_mut(fname) {
                func.erase_value_and_users(*slot);
            }
        }
    }
}

impl Transform for IpoContext {
    fn name(&self) -> &'static str {
        "IPObfuscation"
    }

    fn apply(&mut self, module: &mut Module, prng: &mut Prng) -> Result<bool> {
        self.survey(module);
        self.alloca_secret_slots(module, prng);

        for name in self.local_functions.clone() {
            self.insert_secret_argument(module, &name)?;
        }
        for name in self.local_functions.clone() {
            self.compute_call_site_secret(module, &name)?;
        }
        self.remove_dead_slots(module);

        Ok(!self.infos.is_empty())
    }
}
