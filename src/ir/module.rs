use crate::ir::instr::{BlockId, FuncId, GlobalId, Instr, InstrId, Op, Val, ValKind};
use crate::ir::ty::Type;

/// A string constant hoisted to module scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub label: Option<String>,
    pub instrs: Vec<InstrId>,
    pub func: Option<FuncId>,
    pub detached: bool,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    /// Always a `Type::Func`.
    pub ty: Type,
    pub blocks: Vec<BlockId>,
    /// Erased or never-attached functions stay in the
    /// arena as tombstones so ids remain stable; the
    /// printer and verifier skip them.
    pub detached: bool,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn param_types(&self) -> &[Type] {
        match self.ty {
            Type::Func { ref params, .. } => params,
            _ => unreachable!("function carries a non-function type"),
        }
    }

    pub fn ret_type(&self) -> &Type {
        match self.ty {
            Type::Func { ref ret, .. } => ret,
            _ => unreachable!("function carries a non-function type"),
        }
    }

    pub fn is_vararg(&self) -> bool {
        matches!(self.ty, Type::Func { vararg: true, .. })
    }
}

/// One compilation unit: arenas of functions, blocks,
/// instructions and string globals. Uniquely owned by the
/// facade and threaded mutably through the builder.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub target_triple: Option<String>,
    pub funcs: Vec<Function>,
    pub blocks: Vec<Block>,
    pub instrs: Vec<Instr>,
    pub globals: Vec<Global>,
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    // -- functions --

    pub fn add_function(&mut self, name: Option<&str>, ty: Type) -> FuncId {
        debug_assert!(ty.is_func());
        let id = self.funcs.len();
        self.funcs.push(Function {
            name: name.map(|n| n.to_string()),
            ty,
            blocks: vec![],
            detached: false,
        });
        id
    }

    /// Creates a function that is not part of the emitted
    /// module: a prototype produced during a survey pass.
    pub fn add_detached_function(&mut self, name: Option<&str>, ty: Type) -> FuncId {
        let id = self.add_function(name, ty);
        self.funcs[id].detached = true;
        id
    }

    /// Declares `name` if it isn't present yet, and
    /// returns it either way.
    pub fn get_or_insert_function(&mut self, name: &str, ty: Type) -> FuncId {
        match self.get_function(name) {
            Some(id) => id,
            None => self.add_function(Some(name), ty),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| !f.detached && f.name.as_deref() == Some(name))
    }

    /// Tombstones a function and its blocks; ids stay valid.
    pub fn erase_function(&mut self, func: FuncId) {
        self.funcs[func].detached = true;
        for block in std::mem::take(&mut self.funcs[func].blocks) {
            self.blocks[block].detached = true;
        }
    }

    /// The value of a function symbol: a pointer to its
    /// function type.
    pub fn func_val(&self, func: FuncId) -> Val {
        Val {
            kind: ValKind::Func(func),
            ty: self.funcs[func].ty.clone().ptr(),
        }
    }

    pub fn arg_val(&self, func: FuncId, index: usize) -> Val {
        Val {
            kind: ValKind::Arg(func, index),
            ty: self.funcs[func].param_types()[index].clone(),
        }
    }

    // -- blocks --

    /// Creates a basic block, appended to `parent`'s block
    /// list when given. Parentless blocks serve as scope
    /// placeholders and are never printed.
    pub fn create_block(&mut self, parent: Option<FuncId>) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            label: None,
            instrs: vec![],
            func: parent,
            detached: parent.is_none(),
        });
        if let Some(func) = parent {
            self.funcs[func].blocks.push(id);
        }
        id
    }

    pub fn create_named_block(&mut self, parent: FuncId, label: &str) -> BlockId {
        let id = self.create_block(Some(parent));
        self.blocks[id].label = Some(label.to_string());
        id
    }

    pub fn erase_block(&mut self, block: BlockId) {
        if let Some(func) = self.blocks[block].func {
            self.funcs[func].blocks.retain(|&b| b != block);
        }
        self.blocks[block].detached = true;
    }

    /// Whether the block contains a `ret` or branch
    /// anywhere. Used to decide whether a scope body fell
    /// through and needs a branch appended.
    pub fn block_has_terminator(&self, block: BlockId) -> bool {
        self.blocks[block]
            .instrs
            .iter()
            .any(|&i| self.instrs[i].op.is_terminator())
    }

    // -- instructions --

    pub fn push_instr(&mut self, block: BlockId, op: Op, ty: Type) -> InstrId {
        let id = self.instrs.len();
        self.instrs.push(Instr { op, ty });
        self.blocks[block].instrs.push(id);
        id
    }

    pub fn instr_val(&self, instr: InstrId) -> Val {
        Val {
            kind: ValKind::Instr(instr),
            ty: self.instrs[instr].ty.clone(),
        }
    }

    /// The types of every `ret` operand in the function;
    /// `None` entries mark `ret void`.
    pub fn ret_types(&self, func: FuncId) -> Vec<Option<Type>> {
        let mut found = vec![];
        for &block in &self.funcs[func].blocks {
            for &instr in &self.blocks[block].instrs {
                if let Op::Ret { ref val } = self.instrs[instr].op {
                    found.push(val.as_ref().map(|v| v.ty.clone()));
                }
            }
        }
        found
    }

    // -- globals --

    pub fn add_string_global(&mut self, data: &str) -> GlobalId {
        let id = self.globals.len();
        let mut bytes = data.as_bytes().to_vec();
        bytes.push(0);
        self.globals.push(Global {
            name: format!(".str.{}", id),
            data: bytes,
        });
        id
    }
}
