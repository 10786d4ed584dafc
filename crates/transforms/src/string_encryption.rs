//! String encryption.
//!
//! Interns every constant C string into one encrypted pool laid out as
//! `junk | key | ciphertext | junk | …`, synthesizes an idempotent decrypt
//! routine per string and a lazy initializer per aggregate global that
//! embeds one, then rewrites every use of a plaintext constant to first
//! invoke the decryptor and read from a private plaintext buffer. The
//! original constants become unreferenced and are swept.

use std::collections::HashSet;

use goron_core::ir::{
    BinOp, CmpOp, Const, FuncBuilder, Global, Inst, Linkage, Module, Operand, Param, Ty,
};
use goron_core::lower::lower_constant_expr;
use goron_core::seed::Prng;
use tracing::debug;

use crate::options::ObfuscationOptions;
use crate::{Result, Transform};

/// One interned constant string.
struct CspEntry {
    /// Dense pool index.
    id: usize,
    /// The original global's name.
    orig: String,
    /// Raw bytes, encrypted in place.
    data: Vec<u8>,
    /// Per-string random key.
    enc_key: Vec<u8>,
    /// Byte offset of the key inside the pool.
    offset: usize,
    /// Private zero-initialized plaintext destination.
    dec_gv: String,
    /// Private i32 flag: 0 = not yet decrypted, 1 = decrypted.
    dec_status: String,
    /// The generated decryption routine.
    dec_func: String,
}

/// One aggregate global whose initializer embeds an interned string.
struct CsUser {
    /// The original global's name.
    orig: String,
    /// Value type of the original global.
    ty: Ty,
    /// Private zero-initialized twin.
    dec_gv: String,
    /// Private i32 decryption flag.
    dec_status: String,
    /// The generated lazy initializer.
    init_func: String,
    /// Whether the lowered value must be registered as an ObjC selector.
    selector: bool,
}

/// The module-level string-encryption pass.
pub struct StringEncryption {
    options: ObfuscationOptions,
    entries: Vec<CspEntry>,
    users: Vec<CsUser>,
}

const POOL_NAME: &str = "EncryptedStringTable";

impl StringEncryption {
    pub fn new(options: ObfuscationOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            users: Vec::new(),
        }
    }

    /// Number of strings interned by the last run.
    pub fn encrypted_count(&self) -> usize {
        self.entries.len()
    }

    /// Raw little-endian bytes of a constant data array.
    fn raw_bytes(elem_bits: u16, data: &[u64]) -> Vec<u8> {
        let stride = (elem_bits as usize).div_ceil(8);
        let mut out = Vec::with_capacity(data.len() * stride);
        for &elt in data {
            out.extend_from_slice(&elt.to_le_bytes()[..stride]);
        }
        out
    }

    /// Collect every well-formed constant C string and allocate its
    /// plaintext twin and status flag.
    fn collect_strings(&mut self, module: &mut Module) {
        let candidates: Vec<(String, Ty, u32, u16, Vec<u64>)> = module
            .globals
            .iter()
            .filter(|g| g.is_const && g.init.as_ref().is_some_and(Const::is_c_string))
            .map(|g| {
                let Some(Const::Bytes { elem_bits, data }) = &g.init else {
                    unreachable!("is_c_string implies a data array");
                };
                (g.name.clone(), g.ty.clone(), g.align, *elem_bits, data.clone())
            })
            .collect();

        for (name, ty, align, elem_bits, data) in candidates {
            let id = self.entries.len();
            let dec_gv = format!("dec{id:x}{name}");
            let dec_status = format!("dec_status_{id:x}{name}");

            let mut twin = Global::private_mut(dec_gv.clone(), ty.clone(), Const::Zero(ty));
            twin.align = align;
            module
                .add_global(twin)
                .expect("plaintext twin name is fresh");
            module
                .add_global(Global::private_mut(
                    dec_status.clone(),
                    Ty::i32(),
                    Const::i32(0),
                ))
                .expect("status flag name is fresh");

            debug!(string = %name, id, "interned constant string");
            self.entries.push(CspEntry {
                id,
                orig: name,
                data: Self::raw_bytes(elem_bits, &data),
                enc_key: Vec::new(),
                offset: 0,
                dec_gv,
                dec_status,
                dec_func: String::new(),
            });
        }
    }

    fn is_objc_selector_ptr(global: &Global) -> bool {
        global.externally_initialized
            && global.linkage.is_local()
            && global.name.starts_with("OBJC_SELECTOR_REFERENCES_")
    }

    fn is_cf_constant_string_tag(global: &Global) -> bool {
        matches!(
            &global.ty,
            Ty::Struct { name: Some(tag), .. } if tag == "struct.__NSConstantString_tag"
        )
    }

    fn is_valid_to_encrypt(global: &Global) -> bool {
        if global.init.is_none() {
            return false;
        }
        global.is_const
            || Self::is_objc_selector_ptr(global)
            || Self::is_cf_constant_string_tag(global)
    }

    /// Collect globals whose initializers embed an interned string, and give
    /// each supported one a twin, a flag and a lazy initializer.
    fn collect_users(&mut self, module: &mut Module) {
        let interned: HashSet<&str> = self.entries.iter().map(|e| e.orig.as_str()).collect();
        let candidates: Vec<String> = module
            .globals
            .iter()
            .filter(|g| !interned.contains(g.name.as_str()))
            .filter(|g| {
                g.init
                    .as_ref()
                    .is_some_and(|init| interned.iter().any(|s| init.references_global(s)))
            })
            .filter(|g| Self::is_valid_to_encrypt(g))
            .map(|g| g.name.clone())
            .collect();

        for name in candidates {
            let global = module.global(&name).expect("candidate exists");
            let ty = global.ty.clone();
            let align = global.align;
            let selector = Self::is_objc_selector_ptr(global);
            let init = global.init.clone().expect("validated initializer");

            let dec_gv = format!("dec_{name}");
            let dec_status = format!("dec_status_{name}");
            let init_func = format!("global_variable_init_{name}");

            let mut twin =
                Global::private_mut(dec_gv.clone(), ty.clone(), Const::Zero(ty.clone()));
            twin.align = align;
            module.add_global(twin).expect("user twin name is fresh");
            module
                .add_global(Global::private_mut(
                    dec_status.clone(),
                    Ty::i32(),
                    Const::i32(0),
                ))
                .expect("user flag name is fresh");

            let user = CsUser {
                orig: name,
                ty,
                dec_gv,
                dec_status,
                init_func,
                selector,
            };
            Self::build_init_function(module, &user, &init);
            self.users.push(user);
        }
    }

    /// Encrypt every entry in place and synthesize its decryptor.
    fn encrypt_strings(&mut self, module: &mut Module, prng: &mut Prng) {
        for entry in &mut self.entries {
            entry.enc_key = prng.bytes_in_range(16, 32);
            for (i, byte) in entry.data.iter_mut().enumerate() {
                *byte ^= entry.enc_key[i % entry.enc_key.len()];
            }
            entry.dec_func = Self::build_decrypt_function(module, entry);
        }
    }

    /// Emit the pool: `junk | key_1 | ciphertext_1 | junk | key_2 | …`,
    /// with each entry's offset pointing at the first byte of its key.
    /// Returns the pool's byte length.
    fn emit_pool(&mut self, module: &mut Module, prng: &mut Prng) -> usize {
        let mut data: Vec<u8> = Vec::new();
        for entry in &mut self.entries {
            let junk = prng.bytes_in_range(16, 32);
            data.extend_from_slice(&junk);
            entry.offset = data.len();
            data.extend_from_slice(&entry.enc_key);
            data.extend_from_slice(&entry.data);
        }

        let len = data.len();
        module
            .add_global(Global::private_const(
                POOL_NAME,
                Ty::Array(Box::new(Ty::i8()), len),
                Const::Bytes {
                    elem_bits: 8,
                    data: data.into_iter().map(u64::from).collect(),
                },
            ))
            .expect("one pool per module");
        len
    }

    /// The decrypt routine for one entry:
    ///
    /// ```text
    /// void goron_decrypt_string_<id>(u8 *plain_string, const u8 *data) {
    ///     if (status == 1) return;
    ///     for (i = 0; i != len; i++)
    ///         plain_string[i] = data[key_size + i] ^ data[i % key_size];
    ///     status = 1;
    /// }
    /// ```
    fn build_decrypt_function(module: &mut Module, entry: &CspEntry) -> String {
        let name = format!("goron_decrypt_string_{:x}", entry.id);
        let key_size = entry.enc_key.len() as u32;
        let data_len = entry.data.len() as u32;

        let mut out = Param::new("plain_string", Ty::i8().ptr_to());
        out.attrs.push("nocapture".into());
        let mut input = Param::new("data", Ty::i8().ptr_to());
        input.attrs.push("nocapture".into());
        input.attrs.push("readonly".into());

        let mut b = FuncBuilder::with_entry(&name, vec![out, input], Ty::Void, "Enter")
            .linkage(Linkage::Private);

        let enc_ptr = b.gep(
            Ty::i8(),
            Operand::Arg(1),
            vec![FuncBuilder::const_i32(key_size)],
        );
        let status = b.load(
            Ty::i32(),
            Operand::Const(Const::Global(entry.dec_status.clone())),
        );
        let decrypted = b.icmp(
            CmpOp::Eq,
            32,
            Operand::Value(status),
            FuncBuilder::const_i32(1),
        );
        b.cond_br(Operand::Value(decrypted), "Exit", "LoopBody");

        b.block("LoopBody");
        let counter = b.phi(
            Ty::i32(),
            vec![(FuncBuilder::const_i32(0), "Enter".into())],
        );
        let enc_char_ptr = b.gep(Ty::i8(), Operand::Value(enc_ptr), vec![Operand::Value(counter)]);
        let enc_char = b.load(Ty::i8(), Operand::Value(enc_char_ptr));
        let key_idx = b.bin(
            BinOp::URem,
            32,
            Operand::Value(counter),
            FuncBuilder::const_i32(key_size),
        );
        let key_char_ptr = b.gep(Ty::i8(), Operand::Arg(1), vec![Operand::Value(key_idx)]);
        let key_char = b.load(Ty::i8(), Operand::Value(key_char_ptr));
        let dec_char = b.bin(
            BinOp::Xor,
            8,
            Operand::Value(enc_char),
            Operand::Value(key_char),
        );
        let dec_char_ptr = b.gep(Ty::i8(), Operand::Arg(0), vec![Operand::Value(counter)]);
        b.store(Operand::Value(dec_char), Operand::Value(dec_char_ptr));
        let next = b.bin(
            BinOp::Add,
            32,
            Operand::Value(counter),
            FuncBuilder::const_i32(1),
        );
        b.add_incoming(counter, Operand::Value(next), "LoopBody");
        let done = b.icmp(
            CmpOp::Eq,
            32,
            Operand::Value(next),
            FuncBuilder::const_i32(data_len),
        );
        b.cond_br(Operand::Value(done), "UpdateDecStatus", "LoopBody");

        b.block("UpdateDecStatus");
        b.store(
            FuncBuilder::const_i32(1),
            Operand::Const(Const::Global(entry.dec_status.clone())),
        );
        b.br("Exit");

        b.block("Exit");
        b.ret_void();

        module
            .add_function(b.finish())
            .expect("decryptor name is fresh");
        name
    }

    /// The lazy initializer for one aggregate user: on first call it lowers
    /// the original constant initializer into the twin, field by field, and
    /// flips the status flag. The plaintext strings it references are
    /// themselves rewritten afterwards, so the lowering pulls decrypted
    /// bytes at run time.
    fn build_init_function(module: &mut Module, user: &CsUser, init: &Const) {
        let mut this = Param::new("this", user.ty.ptr_to());
        this.attrs.push("nocapture".into());

        let mut b =
            FuncBuilder::with_entry(&user.init_func, vec![this], Ty::Void, "Enter")
                .linkage(Linkage::Private);

        let status = b.load(
            Ty::i32(),
            Operand::Const(Const::Global(user.dec_status.clone())),
        );
        let decrypted = b.icmp(
            CmpOp::Eq,
            32,
            Operand::Value(status),
            FuncBuilder::const_i32(1),
        );
        b.cond_br(Operand::Value(decrypted), "Exit", "InitBlock");

        b.block("InitBlock");
        Self::lower_global_constant(&mut b, init, &user.ty, Operand::Arg(0));
        if user.selector {
            ensure_sel_register_name(module);
            let selector = b.call(
                "sel_registerName",
                Ty::i8().ptr_to(),
                vec![Operand::Const(init.clone())],
            );
            b.store(
                Operand::Value(selector),
                Operand::Const(Const::Global(user.dec_gv.clone())),
            );
        }
        b.store(
            FuncBuilder::const_i32(1),
            Operand::Const(Const::Global(user.dec_status.clone())),
        );
        b.br("Exit");

        b.block("Exit");
        b.ret_void();

        module
            .add_function(b.finish())
            .expect("initializer name is fresh");
    }

    /// Lower a constant initializer into stores through `ptr`, descending
    /// element-wise through arrays and structs.
    fn lower_global_constant(b: &mut FuncBuilder, c: &Const, ty: &Ty, ptr: Operand) {
        match c {
            Const::Zero(_) => b.store(Operand::Const(c.clone()), ptr),
            Const::Array { elems, .. } => {
                let Ty::Array(elem_ty, _) = ty else {
                    b.store(Operand::Const(c.clone()), ptr);
                    return;
                };
                for (i, elem) in elems.iter().enumerate() {
                    let slot = b.gep(
                        ty.clone(),
                        ptr.clone(),
                        vec![FuncBuilder::const_i32(0), FuncBuilder::const_i32(i as u32)],
                    );
                    Self::lower_global_constant(b, elem, elem_ty, Operand::Value(slot));
                }
            }
            Const::Struct { fields, .. } => {
                let Ty::Struct { fields: field_tys, .. } = ty else {
                    b.store(Operand::Const(c.clone()), ptr);
                    return;
                };
                for (i, (field, field_ty)) in fields.iter().zip(field_tys).enumerate() {
                    let slot = b.gep(
                        ty.clone(),
                        ptr.clone(),
                        vec![FuncBuilder::const_i32(0), FuncBuilder::const_i32(i as u32)],
                    );
                    Self::lower_global_constant(b, field, field_ty, Operand::Value(slot));
                }
            }
            scalar => b.store(Operand::Const(scalar.clone()), ptr),
        }
    }

    /// The decrypt-call operands for one entry: the twin as an `i8*` and
    /// the pool displaced to the entry's key.
    fn decrypt_call_args(&self, entry_idx: usize, pool_len: usize) -> Vec<Operand> {
        let entry = &self.entries[entry_idx];
        vec![
            Operand::Const(Const::Cast {
                to: Ty::i8().ptr_to(),
                val: Box::new(Const::Global(entry.dec_gv.clone())),
            }),
            Operand::Const(Const::Gep {
                elem_ty: Ty::Array(Box::new(Ty::i8()), pool_len),
                base: Box::new(Const::Global(POOL_NAME.to_string())),
                indices: vec![0, entry.offset as i64],
            }),
        ]
    }

    /// Rewrite every use of a plaintext constant inside `fname`: decrypt or
    /// initialize before the first use in each block, and redirect the
    /// operand at the twin. Phi operands decrypt at the incoming block's
    /// terminator, never in front of the phi.
    fn process_constant_string_use(
        &self,
        module: &mut Module,
        fname: &str,
        pool_len: usize,
        maybe_dead: &mut Vec<String>,
    ) -> Result<bool> {
        {
            let Some(func) = module.function(fname) else {
                return Ok(false);
            };
            if !self
                .options
                .to_obfuscate(self.options.enable_string_encryption, func, "cse")
            {
                return Ok(false);
            }
        }

        let entry_of = |name: &str| self.entries.iter().position(|e| e.orig == name);
        let user_of = |name: &str| self.users.iter().position(|u| u.orig == name);

        let func = module.function_mut(fname).expect("checked above");
        lower_constant_expr(func);

        let mut changed = false;
        let mut pending_calls: Vec<(String, Vec<(String, Vec<Operand>)>)> = Vec::new();

        let labels: Vec<String> = func.blocks.iter().map(|b| b.label.clone()).collect();
        for label in &labels {
            // first use per block decrypts; later uses just redirect
            let mut decrypted: HashSet<String> = HashSet::new();
            let bi = func.block_index(label).expect("snapshot label");

            let mut ii = 0;
            loop {
                #[derive(Clone, Copy)]
                enum Site {
                    Inst(usize),
                    Term,
                }
                let site = if ii < func.blocks[bi].insts.len() {
                    Site::Inst(ii)
                } else if ii == func.blocks[bi].insts.len() {
                    Site::Term
                } else {
                    break;
                };

                // Collect referenced pool names at this site, phi-style uses
                // separated because their decrypt call belongs to the
                // predecessor block.
                let mut plain_uses: Vec<String> = Vec::new();
                let mut phi_uses: Vec<(String, String)> = Vec::new();
                {
                    let mut see = |op: &Operand, pred: Option<&str>| {
                        if let Some(name) = op.as_global() {
                            if entry_of(name).is_some() || user_of(name).is_some() {
                                match pred {
                                    Some(pred) => {
                                        phi_uses.push((name.to_string(), pred.to_string()))
                                    }
                                    None => plain_uses.push(name.to_string()),
                                }
                            }
                        }
                    };
                    match site {
                        Site::Inst(ii) => match &func.blocks[bi].insts[ii] {
                            Inst::Phi { incoming, .. } => {
                                for (op, pred) in incoming {
                                    see(op, Some(pred.as_str()));
                                }
                            }
                            inst => inst.for_each_operand(&mut |op| see(op, None)),
                        },
                        Site::Term => func.blocks[bi].term.for_each_operand(&mut |op| see(op, None)),
                    }
                }

                if plain_uses.is_empty() && phi_uses.is_empty() {
                    ii += 1;
                    continue;
                }
                changed = true;

                // Insert decrypt/init calls ahead of this site for
                // first-in-block uses.
                let mut inserted = 0usize;
                for name in &plain_uses {
                    if !decrypted.insert(name.clone()) {
                        continue;
                    }
                    let (callee, args) = self.call_for(name, pool_len);
                    let at = match site {
                        Site::Inst(ii) => ii + inserted,
                        Site::Term => func.blocks[bi].insts.len(),
                    };
                    func.blocks[bi].insts.insert(at, call_void(callee, args));
                    inserted += 1;
                    if !maybe_dead.iter().any(|d| d == name) {
                        maybe_dead.push(name.clone());
                    }
                }
                for (name, pred) in &phi_uses {
                    if !decrypted.insert(name.clone()) {
                        continue;
                    }
                    let (callee, args) = self.call_for(name, pool_len);
                    pending_calls.push((pred.clone(), vec![(callee, args)]));
                    if !maybe_dead.iter().any(|d| d == name) {
                        maybe_dead.push(name.clone());
                    }
                }

                // Redirect every matching operand of this site at the twin.
                let mut rewrite = |op: &mut Operand| {
                    if let Some(name) = op.as_global() {
                        if let Some(e) = entry_of(name) {
                            *op = Operand::Const(Const::Global(self.entries[e].dec_gv.clone()));
                        } else if let Some(u) = user_of(name) {
                            *op = Operand::Const(Const::Global(self.users[u].dec_gv.clone()));
                        }
                    }
                };
                match site {
                    Site::Inst(at) => {
                        let at = at + inserted;
                        func.blocks[bi].insts[at].for_each_operand_mut(&mut rewrite);
                    }
                    Site::Term => func.blocks[bi].term.for_each_operand_mut(&mut rewrite),
                }

                ii += inserted + 1;
            }
        }

        // Phi-feeding decrypt calls land in front of the incoming block's
        // terminator.
        for (pred, calls) in pending_calls {
            let block = func.expect_block_mut(&pred).map_err(crate::Error::Core)?;
            for (callee, args) in calls {
                block.insts.push(call_void(callee, args));
            }
        }

        Ok(changed)
    }

    fn call_for(&self, name: &str, pool_len: usize) -> (String, Vec<Operand>) {
        if let Some(e) = self.entries.iter().position(|e| e.orig == name) {
            (
                self.entries[e].dec_func.clone(),
                self.decrypt_call_args(e, pool_len),
            )
        } else {
            let u = self
                .users
                .iter()
                .position(|u| u.orig == name)
                .expect("name is interned or a user");
            (
                self.users[u].init_func.clone(),
                vec![Operand::Const(Const::Global(self.users[u].dec_gv.clone()))],
            )
        }
    }

    /// Sweep globals whose uses all disappeared, to a fixed point: erasing
    /// one dead aggregate can free the strings its initializer held.
    fn delete_unused_global_variables(module: &mut Module, maybe_dead: &mut Vec<String>) {
        let mut changed = true;
        while changed {
            changed = false;
            let snapshot = maybe_dead.clone();
            for name in snapshot {
                let Some(global) = module.global(&name) else {
                    maybe_dead.retain(|n| *n != name);
                    continue;
                };
                if !global.linkage.is_local() {
                    continue;
                }
                if module.count_global_uses(&name) == 0 {
                    if let Some(init) = &module.global(&name).expect("present").init {
                        if !init.is_safe_to_destroy() {
                            debug!(global = %name, "initializer shares addresses; dropping anyway");
                        }
                    }
                    module.remove_global(&name).expect("present");
                    maybe_dead.retain(|n| *n != name);
                    changed = true;
                    debug!(global = %name, "erased unreferenced global");
                }
            }
        }
    }

    /// Erase decryptors (and their twin/flag) that ended up unused because
    /// every use of their string sat in skipped functions.
    fn erase_unused_helpers(&self, module: &mut Module) {
        for entry in &self.entries {
            if module.count_function_uses(&entry.dec_func) == 0 {
                let _ = module.take_function(&entry.dec_func);
                let _ = module.remove_global(&entry.dec_gv);
                let _ = module.remove_global(&entry.dec_status);
            }
        }
    }
}

fn call_void(callee: String, args: Vec<Operand>) -> Inst {
    Inst::Call {
        dest: None,
        callee: goron_core::ir::Callee::Direct(callee),
        args,
        ret_ty: Ty::Void,
        cconv: goron_core::ir::CallConv::C,
        attrs: goron_core::ir::AttrList::default(),
        tail: false,
        dbg: None,
    }
}

/// Declare `sel_registerName` if the module does not have it yet.
fn ensure_sel_register_name(module: &mut Module) {
    if module.function("sel_registerName").is_none() {
        module
            .add_function(goron_core::ir::Function::declaration(
                "sel_registerName",
                vec![Param::new("name", Ty::i8().ptr_to())],
                Ty::i8().ptr_to(),
            ))
            .expect("checked absence");
    }
}

impl Transform for StringEncryption {
    fn name(&self) -> &'static str {
        "StringEncryption"
    }

    fn apply(&mut self, module: &mut Module, prng: &mut Prng) -> Result<bool> {
        self.collect_strings(module);
        if self.entries.is_empty() {
            debug!("no encryptable strings in module");
            return Ok(false);
        }
        self.encrypt_strings(module, prng);
        self.collect_users(module);
        let pool_len = self.emit_pool(module, prng);

        let mut changed = false;
        let mut maybe_dead: Vec<String> = Vec::new();
        let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        for name in names {
            changed |=
                self.process_constant_string_use(module, &name, pool_len, &mut maybe_dead)?;
        }

        Self::delete_unused_global_variables(module, &mut maybe_dead);
        self.erase_unused_helpers(module);

        Ok(changed)
    }
}
