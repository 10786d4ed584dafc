//! Reference evaluator for the IR.
//!
//! Executes the instruction subset the obfuscation passes produce, so tests
//! can run a module before and after rewriting and compare observable
//! behavior. Memory objects store raw bytes plus a side table of
//! pointer-sized slots; pointers are (object, byte offset) pairs, and block
//! addresses are first-class pointer values carrying a byte offset, which is
//! how encrypted branch-target tables round-trip through load/gep exactly.
//!
//! Declarations are served by host shims: `strlen`, `puts` and
//! `sel_registerName`.

use std::collections::HashMap;

use crate::ir::{BinOp, Callee, CmpOp, Const, Function, Inst, Module, Operand, Term, Ty, ValueId};
use crate::result::{Error, Result};

const DEFAULT_FUEL: u64 = 1_000_000;
const MAX_CALL_DEPTH: usize = 256;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    /// An integer, stored wrapped to its width.
    Int { bits: u16, value: u64 },
    /// A pointer.
    Ptr(PtrVal),
}

impl Val {
    /// An `i32` value.
    pub fn i32(value: u32) -> Val {
        Val::Int {
            bits: 32,
            value: value as u64,
        }
    }

    /// The integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Val::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// A pointer value.
#[derive(Debug, Clone, PartialEq)]
pub enum PtrVal {
    Null,
    /// Into a memory object (global or stack slot).
    Mem { obj: usize, off: i64 },
    /// The address of a function.
    Func(String),
    /// The address of a basic block, possibly displaced.
    Block {
        func: String,
        block: String,
        off: i64,
    },
}

#[derive(Default)]
struct MemObj {
    bytes: Vec<u8>,
    /// Pointer-typed slots keyed by byte offset; they shadow `bytes`.
    ptrs: HashMap<usize, PtrVal>,
}

/// One evaluation machine over a module. Global state persists across calls
/// on the same machine, so lazy-decryption effects are observable.
pub struct Machine<'m> {
    module: &'m Module,
    objects: Vec<MemObj>,
    globals: HashMap<String, usize>,
    fuel: u64,
    /// Bytes written by the `puts` shim.
    pub stdout: Vec<u8>,
}

impl<'m> Machine<'m> {
    /// Materialize every global and return a ready machine.
    pub fn new(module: &'m Module) -> Result<Self> {
        let mut machine = Self {
            module,
            objects: Vec::new(),
            globals: HashMap::new(),
            fuel: DEFAULT_FUEL,
            stdout: Vec::new(),
        };
        for global in &module.globals {
            let size = global.ty.size_of().max(1);
            machine.objects.push(MemObj {
                bytes: vec![0; size],
                ptrs: HashMap::new(),
            });
            machine
                .globals
                .insert(global.name.clone(), machine.objects.len() - 1);
        }
        // Initializers may reference other globals, so write them only after
        // every object exists.
        for global in &module.globals {
            if let Some(init) = &global.init {
                let obj = machine.globals[&global.name];
                let init = init.clone();
                machine.write_const(obj, 0, &init)?;
            }
        }
        Ok(machine)
    }

    /// Set the instruction budget for subsequent calls.
    pub fn set_fuel(&mut self, fuel: u64) {
        self.fuel = fuel;
    }

    /// Call a function by name.
    pub fn call(&mut self, name: &str, args: &[Val]) -> Result<Option<Val>> {
        self.call_depth(name, args, 0)
    }

    /// The decoded `stdout` of all `puts` shim invocations so far.
    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Read `len` bytes at the location a global's storage occupies.
    pub fn global_bytes(&self, name: &str, len: usize) -> Result<Vec<u8>> {
        let &obj = self
            .globals
            .get(name)
            .ok_or_else(|| Error::UnknownGlobal(name.to_string()))?;
        Ok(self.objects[obj].bytes[..len.min(self.objects[obj].bytes.len())].to_vec())
    }

    fn trap(&self, func: &str, reason: impl Into<String>) -> Error {
        Error::Trap {
            func: func.to_string(),
            reason: reason.into(),
        }
    }

    fn call_depth(&mut self, name: &str, args: &[Val], depth: usize) -> Result<Option<Val>> {
        if depth > MAX_CALL_DEPTH {
            return Err(self.trap(name, "call depth exceeded"));
        }
        // copy the module reference out so the function borrow is not tied
        // to `self`, which the execution loop borrows mutably
        let module: &'m Module = self.module;
        let func = module.expect_function(name)?;
        if func.is_declaration() {
            return self.shim(name, args);
        }
        self.exec(func, args, depth)
    }

    fn shim(&mut self, name: &str, args: &[Val]) -> Result<Option<Val>> {
        match name {
            "strlen" => {
                let ptr = args
                    .first()
                    .ok_or_else(|| self.trap(name, "missing argument"))?;
                let bytes = self.read_c_string(ptr)?;
                Ok(Some(Val::Int {
                    bits: 64,
                    value: bytes.len() as u64,
                }))
            }
            "puts" => {
                let ptr = args
                    .first()
                    .ok_or_else(|| self.trap(name, "missing argument"))?;
                let bytes = self.read_c_string(ptr)?;
                self.stdout.extend_from_slice(&bytes);
                self.stdout.push(b'\n');
                Ok(Some(Val::i32(0)))
            }
            "sel_registerName" => Ok(Some(
                args.first()
                    .cloned()
                    .ok_or_else(|| self.trap(name, "missing argument"))?,
            )),
            other => Err(self.trap(other, "call to unknown external function")),
        }
    }

    fn read_c_string(&self, ptr: &Val) -> Result<Vec<u8>> {
        let Val::Ptr(PtrVal::Mem { obj, off }) = ptr else {
            return Err(self.trap("<shim>", format!("expected memory pointer, got {ptr:?}")));
        };
        let bytes = &self.objects[*obj].bytes;
        let mut at = usize::try_from(*off)
            .map_err(|_| self.trap("<shim>", "negative pointer offset"))?;
        let mut out = Vec::new();
        while at < bytes.len() && bytes[at] != 0 {
            out.push(bytes[at]);
            at += 1;
        }
        if at >= bytes.len() {
            return Err(self.trap("<shim>", "unterminated string read"));
        }
        Ok(out)
    }

    fn exec(&mut self, func: &Function, args: &[Val], depth: usize) -> Result<Option<Val>> {
        let fname = func.name.clone();
        let mut regs: HashMap<u32, Val> = HashMap::new();
        let mut cur = func
            .entry()
            .ok_or_else(|| self.trap(&fname, "function has no body"))?
            .label
            .clone();
        let mut prev: Option<String> = None;

        loop {
            let block = func.block(&cur).ok_or_else(|| Error::UnknownBlock {
                func: fname.clone(),
                block: cur.clone(),
            })?;

            // Phis evaluate in parallel against the edge just taken.
            let mut phi_writes: Vec<(ValueId, Val)> = Vec::new();
            for inst in &block.insts {
                let Inst::Phi { dest, incoming, .. } = inst else {
                    break;
                };
                let pred = prev
                    .as_deref()
                    .ok_or_else(|| self.trap(&fname, "phi in entry block"))?;
                let (op, _) = incoming
                    .iter()
                    .find(|(_, p)| p == pred)
                    .ok_or_else(|| self.trap(&fname, format!("phi missing edge from {pred}")))?;
                phi_writes.push((*dest, self.eval(func, &regs, args, op)?));
            }
            for (dest, val) in phi_writes {
                regs.insert(dest.0, val);
            }

            for inst in &block.insts {
                if matches!(inst, Inst::Phi { .. }) {
                    continue;
                }
                self.burn()?;
                self.step(func, &mut regs, args, inst, depth)?;
            }

            self.burn()?;
            match &block.term {
                Term::Ret(None) => return Ok(None),
                Term::Ret(Some(op)) => return Ok(Some(self.eval(func, &regs, args, op)?)),
                Term::Br { dest } => {
                    prev = Some(std::mem::replace(&mut cur, dest.clone()));
                }
                Term::CondBr {
                    cond,
                    on_true,
                    on_false,
                } => {
                    let taken = self
                        .eval(func, &regs, args, cond)?
                        .as_int()
                        .ok_or_else(|| self.trap(&fname, "non-integer branch condition"))?;
                    let next = if taken & 1 == 1 { on_true } else { on_false };
                    prev = Some(std::mem::replace(&mut cur, next.clone()));
                }
                Term::IndirectBr { addr, dests } => {
                    let val = self.eval(func, &regs, args, addr)?;
                    let Val::Ptr(PtrVal::Block {
                        func: target_fn,
                        block,
                        off,
                    }) = val
                    else {
                        return Err(self.trap(&fname, format!("indirectbr through {val:?}")));
                    };
                    if target_fn != fname {
                        return Err(self.trap(&fname, "indirectbr into another function"));
                    }
                    if off != 0 {
                        return Err(
                            self.trap(&fname, format!("indirectbr to displaced address ({off:+})"))
                        );
                    }
                    if !dests.iter().any(|d| *d == block) {
                        return Err(self.trap(
                            &fname,
                            format!("indirectbr to {block}, not in destination set"),
                        ));
                    }
                    prev = Some(std::mem::replace(&mut cur, block));
                }
                Term::Invoke {
                    dest,
                    callee,
                    args: call_args,
                    normal,
                    ..
                } => {
                    let mut argv = Vec::with_capacity(call_args.len());
                    for op in call_args {
                        argv.push(self.eval(func, &regs, args, op)?);
                    }
                    let ret = self.dispatch(func, &regs, args, callee, argv, depth)?;
                    if let Some(dest) = dest {
                        let ret = ret
                            .ok_or_else(|| self.trap(&fname, "invoke of void function has dest"))?;
                        regs.insert(dest.0, ret);
                    }
                    // no unwinding is modeled; invokes always take the normal edge
                    prev = Some(std::mem::replace(&mut cur, normal.clone()));
                }
                Term::Unreachable => return Err(self.trap(&fname, "reached unreachable")),
            }
        }
    }

    fn burn(&mut self) -> Result<()> {
        if self.fuel == 0 {
            return Err(Error::FuelExhausted(DEFAULT_FUEL));
        }
        self.fuel -= 1;
        Ok(())
    }

    fn step(
        &mut self,
        func: &Function,
        regs: &mut HashMap<u32, Val>,
        args: &[Val],
        inst: &Inst,
        depth: usize,
    ) -> Result<()> {
        let fname = &func.name;
        match inst {
            Inst::Alloca { dest, ty, .. } => {
                self.objects.push(MemObj {
                    bytes: vec![0; ty.size_of().max(1)],
                    ptrs: HashMap::new(),
                });
                regs.insert(
                    dest.0,
                    Val::Ptr(PtrVal::Mem {
                        obj: self.objects.len() - 1,
                        off: 0,
                    }),
                );
            }
            Inst::Load { dest, ty, ptr } => {
                let ptr = self.eval(func, regs, args, ptr)?;
                let val = self.load_val(fname, &ptr, ty)?;
                regs.insert(dest.0, val);
            }
            Inst::Store { val, ptr } => {
                let ptr = self.eval(func, regs, args, ptr)?;
                let Val::Ptr(PtrVal::Mem { obj, off }) = ptr else {
                    return Err(self.trap(fname, format!("store through {ptr:?}")));
                };
                let off = usize::try_from(off)
                    .map_err(|_| self.trap(fname, "store at negative offset"))?;
                // aggregate constants store their full image directly
                let aggregate = match val {
                    Operand::Const(c)
                        if matches!(
                            c,
                            Const::Zero(_)
                                | Const::Bytes { .. }
                                | Const::Array { .. }
                                | Const::Struct { .. }
                        ) =>
                    {
                        Some(c.clone())
                    }
                    _ => None,
                };
                if let Some(c) = aggregate {
                    self.write_const(obj, off, &c)?;
                } else {
                    let val = self.eval(func, regs, args, val)?;
                    self.store_scalar(obj, off, val);
                }
            }
            Inst::Bin {
                dest,
                op,
                bits,
                lhs,
                rhs,
            } => {
                let l = self
                    .eval(func, regs, args, lhs)?
                    .as_int()
                    .ok_or_else(|| self.trap(fname, "non-integer arithmetic operand"))?;
                let r = self
                    .eval(func, regs, args, rhs)?
                    .as_int()
                    .ok_or_else(|| self.trap(fname, "non-integer arithmetic operand"))?;
                let value = match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::And => l & r,
                    BinOp::Or => l | r,
                    BinOp::Xor => l ^ r,
                    BinOp::URem => {
                        if r == 0 {
                            return Err(self.trap(fname, "remainder by zero"));
                        }
                        l % r
                    }
                };
                regs.insert(
                    dest.0,
                    Val::Int {
                        bits: *bits,
                        value: truncate(value, *bits),
                    },
                );
            }
            Inst::Icmp {
                dest,
                op,
                bits,
                lhs,
                rhs,
            } => {
                let l = self
                    .eval(func, regs, args, lhs)?
                    .as_int()
                    .ok_or_else(|| self.trap(fname, "non-integer comparison operand"))?;
                let r = self
                    .eval(func, regs, args, rhs)?
                    .as_int()
                    .ok_or_else(|| self.trap(fname, "non-integer comparison operand"))?;
                let (l, r) = (truncate(l, *bits), truncate(r, *bits));
                let (sl, sr) = (sign_extend(l, *bits), sign_extend(r, *bits));
                let hit = match op {
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                    CmpOp::Ult => l < r,
                    CmpOp::Ule => l <= r,
                    CmpOp::Ugt => l > r,
                    CmpOp::Uge => l >= r,
                    CmpOp::Slt => sl < sr,
                    CmpOp::Sle => sl <= sr,
                    CmpOp::Sgt => sl > sr,
                    CmpOp::Sge => sl >= sr,
                };
                regs.insert(
                    dest.0,
                    Val::Int {
                        bits: 1,
                        value: hit as u64,
                    },
                );
            }
            Inst::Select {
                dest,
                cond,
                on_true,
                on_false,
                ..
            } => {
                let c = self
                    .eval(func, regs, args, cond)?
                    .as_int()
                    .ok_or_else(|| self.trap(fname, "non-integer select condition"))?;
                let picked = if c & 1 == 1 { on_true } else { on_false };
                let val = self.eval(func, regs, args, picked)?;
                regs.insert(dest.0, val);
            }
            Inst::Phi { .. } => unreachable!("phis are evaluated at block entry"),
            Inst::Gep {
                dest,
                elem_ty,
                base,
                indices,
                ..
            } => {
                let base = self.eval(func, regs, args, base)?;
                let Val::Ptr(ptr) = base else {
                    return Err(self.trap(fname, format!("gep over {base:?}")));
                };
                let mut idx = Vec::with_capacity(indices.len());
                for op in indices {
                    let v = self.eval(func, regs, args, op)?;
                    let Val::Int { bits, value } = v else {
                        return Err(self.trap(fname, "non-integer gep index"));
                    };
                    idx.push(sign_extend(value, bits));
                }
                let delta = gep_offset(elem_ty, &idx)
                    .ok_or_else(|| self.trap(fname, "gep index outside aggregate"))?;
                regs.insert(dest.0, Val::Ptr(displace(ptr, delta)));
            }
            Inst::Cast { dest, val, .. } => {
                let val = self.eval(func, regs, args, val)?;
                regs.insert(dest.0, val);
            }
            Inst::Call {
                dest,
                callee,
                args: call_args,
                ..
            } => {
                let mut argv = Vec::with_capacity(call_args.len());
                for op in call_args {
                    argv.push(self.eval(func, regs, args, op)?);
                }
                let ret = self.dispatch(func, regs, args, callee, argv, depth)?;
                if let Some(dest) = dest {
                    let ret =
                        ret.ok_or_else(|| self.trap(fname, "call of void function has dest"))?;
                    regs.insert(dest.0, ret);
                }
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        func: &Function,
        regs: &HashMap<u32, Val>,
        args: &[Val],
        callee: &Callee,
        argv: Vec<Val>,
        depth: usize,
    ) -> Result<Option<Val>> {
        match callee {
            Callee::Direct(name) => self.call_depth(name, &argv, depth + 1),
            Callee::Indirect(op) => {
                let target = self.eval(func, regs, args, op)?;
                let Val::Ptr(PtrVal::Func(name)) = target else {
                    return Err(self.trap(&func.name, format!("indirect call through {target:?}")));
                };
                self.call_depth(&name, &argv, depth + 1)
            }
        }
    }

    fn eval(
        &self,
        func: &Function,
        regs: &HashMap<u32, Val>,
        args: &[Val],
        op: &Operand,
    ) -> Result<Val> {
        match op {
            Operand::Value(v) => regs
                .get(&v.0)
                .cloned()
                .ok_or_else(|| self.trap(&func.name, format!("use of undefined value %v{}", v.0))),
            Operand::Arg(i) => args
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| self.trap(&func.name, format!("missing argument {i}"))),
            Operand::Const(c) => self.eval_const(&func.name, c),
        }
    }

    fn eval_const(&self, fname: &str, c: &Const) -> Result<Val> {
        match c {
            Const::Int { bits, value } => Ok(Val::Int {
                bits: *bits,
                value: truncate(*value, *bits),
            }),
            Const::Null(_) => Ok(Val::Ptr(PtrVal::Null)),
            Const::Global(name) => {
                let &obj = self
                    .globals
                    .get(name)
                    .ok_or_else(|| Error::UnknownGlobal(name.clone()))?;
                Ok(Val::Ptr(PtrVal::Mem { obj, off: 0 }))
            }
            Const::Func(name) => Ok(Val::Ptr(PtrVal::Func(name.clone()))),
            Const::BlockAddr { func, block } => Ok(Val::Ptr(PtrVal::Block {
                func: func.clone(),
                block: block.clone(),
                off: 0,
            })),
            Const::Gep {
                elem_ty,
                base,
                indices,
            } => {
                let base = self.eval_const(fname, base)?;
                let Val::Ptr(ptr) = base else {
                    return Err(self.trap(fname, "constant gep over non-pointer"));
                };
                let delta = gep_offset(elem_ty, indices)
                    .ok_or_else(|| self.trap(fname, "constant gep outside aggregate"))?;
                Ok(Val::Ptr(displace(ptr, delta)))
            }
            Const::Cast { val, .. } => self.eval_const(fname, val),
            Const::Zero(_) | Const::Bytes { .. } | Const::Array { .. } | Const::Struct { .. } => {
                Err(self.trap(fname, "aggregate constant used as scalar"))
            }
        }
    }

    fn load_val(&self, fname: &str, ptr: &Val, ty: &Ty) -> Result<Val> {
        let Val::Ptr(PtrVal::Mem { obj, off }) = ptr else {
            return Err(self.trap(fname, format!("load through {ptr:?}")));
        };
        let off =
            usize::try_from(*off).map_err(|_| self.trap(fname, "load at negative offset"))?;
        let mem = &self.objects[*obj];
        match ty {
            Ty::Int(bits) => {
                let n = (*bits as usize).div_ceil(8);
                if off + n > mem.bytes.len() {
                    return Err(self.trap(fname, "out-of-bounds load"));
                }
                let mut value = 0u64;
                for (k, &b) in mem.bytes[off..off + n].iter().enumerate() {
                    value |= (b as u64) << (8 * k);
                }
                Ok(Val::Int {
                    bits: *bits,
                    value: truncate(value, *bits),
                })
            }
            Ty::Ptr(_) => {
                if let Some(p) = mem.ptrs.get(&off) {
                    return Ok(Val::Ptr(p.clone()));
                }
                if mem.bytes.get(off..off + 8).is_some_and(|w| w.iter().all(|&b| b == 0)) {
                    return Ok(Val::Ptr(PtrVal::Null));
                }
                Err(self.trap(fname, "load of non-pointer bytes as pointer"))
            }
            other => Err(self.trap(fname, format!("unsupported load type {other:?}"))),
        }
    }

    fn store_scalar(&mut self, obj: usize, off: usize, val: Val) {
        match val {
            Val::Int { bits, value } => {
                let n = (bits as usize).div_ceil(8);
                let mem = &mut self.objects[obj];
                if mem.bytes.len() < off + n {
                    mem.bytes.resize(off + n, 0);
                }
                for k in 0..n {
                    mem.bytes[off + k] = (value >> (8 * k)) as u8;
                }
                mem.ptrs.retain(|&slot, _| slot + 8 <= off || slot >= off + n);
            }
            Val::Ptr(p) => {
                let mem = &mut self.objects[obj];
                if mem.bytes.len() < off + 8 {
                    mem.bytes.resize(off + 8, 0);
                }
                mem.bytes[off..off + 8].fill(0);
                mem.ptrs.insert(off, p);
            }
        }
    }

    fn write_const(&mut self, obj: usize, off: usize, c: &Const) -> Result<()> {
        match c {
            Const::Int { bits, value } => {
                self.store_scalar(
                    obj,
                    off,
                    Val::Int {
                        bits: *bits,
                        value: *value,
                    },
                );
            }
            Const::Null(_) => self.store_scalar(obj, off, Val::Ptr(PtrVal::Null)),
            Const::Zero(ty) => {
                let n = ty.size_of();
                let mem = &mut self.objects[obj];
                if mem.bytes.len() < off + n {
                    mem.bytes.resize(off + n, 0);
                }
                mem.bytes[off..off + n].fill(0);
                mem.ptrs.retain(|&slot, _| slot + 8 <= off || slot >= off + n);
            }
            Const::Bytes { elem_bits, data } => {
                let stride = (*elem_bits as usize).div_ceil(8);
                for (k, &elt) in data.iter().enumerate() {
                    self.store_scalar(
                        obj,
                        off + k * stride,
                        Val::Int {
                            bits: *elem_bits,
                            value: elt,
                        },
                    );
                }
            }
            Const::Array { elem, elems } => {
                let stride = elem.size_of();
                for (k, e) in elems.iter().enumerate() {
                    self.write_const(obj, off + k * stride, e)?;
                }
            }
            Const::Struct { fields, .. } => {
                let mut at = off;
                for field in fields {
                    self.write_const(obj, at, field)?;
                    at += const_size(field);
                }
            }
            ptr_like => {
                let val = self.eval_const("<init>", ptr_like)?;
                self.store_scalar(obj, off, val);
            }
        }
        Ok(())
    }
}

/// Byte size a constant occupies in an initializer image.
fn const_size(c: &Const) -> usize {
    match c {
        Const::Int { bits, .. } => (*bits as usize).div_ceil(8),
        Const::Null(_) => 8,
        Const::Zero(ty) => ty.size_of(),
        Const::Bytes { elem_bits, data } => (*elem_bits as usize).div_ceil(8) * data.len(),
        Const::Array { elem, elems } => elem.size_of() * elems.len(),
        Const::Struct { fields, .. } => fields.iter().map(const_size).sum(),
        Const::Global(_) | Const::Func(_) | Const::BlockAddr { .. } => 8,
        Const::Gep { .. } | Const::Cast { .. } => 8,
    }
}

/// Total byte displacement of a gep: the first index strides over `elem_ty`,
/// later indices descend into it.
fn gep_offset(elem_ty: &Ty, indices: &[i64]) -> Option<i64> {
    let mut indices = indices.iter();
    let &first = indices.next()?;
    let mut off = first.checked_mul(elem_ty.size_of() as i64)?;
    let mut ty = elem_ty.clone();
    for &idx in indices {
        match ty {
            Ty::Array(elem, _) => {
                off = off.checked_add(idx.checked_mul(elem.size_of() as i64)?)?;
                ty = *elem;
            }
            Ty::Struct { .. } => {
                let field = usize::try_from(idx).ok()?;
                off = off.checked_add(ty.field_offset(field)? as i64)?;
                let Ty::Struct { mut fields, .. } = ty else {
                    unreachable!();
                };
                ty = fields.swap_remove(field);
            }
            _ => return None,
        }
    }
    Some(off)
}

fn displace(ptr: PtrVal, delta: i64) -> PtrVal {
    match ptr {
        PtrVal::Null => PtrVal::Null,
        PtrVal::Mem { obj, off } => PtrVal::Mem {
            obj,
            off: off.wrapping_add(delta),
        },
        PtrVal::Func(name) => PtrVal::Func(name),
        PtrVal::Block { func, block, off } => PtrVal::Block {
            func,
            block,
            off: off.wrapping_add(delta),
        },
    }
}

fn truncate(value: u64, bits: u16) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

fn sign_extend(value: u64, bits: u16) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits as u32;
        ((value << shift) as i64) >> shift
    }
}
