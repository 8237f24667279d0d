//! Display implementations and a WGSL-flavoured text dump for debugging.

use std::fmt;
use std::fmt::Write as _;

use crate::Module;
use crate::arena::{Handle, UniqueArena};
use crate::expr::{BinaryOp, Expression, Literal, UnaryOp};
use crate::func::{Function, LocalKind};
use crate::global::{AddressSpace, Binding, BuiltIn, ResourceBinding, StorageAccess};
use crate::stmt::{Barrier, Statement};
use crate::types::{ArraySize, Scalar, ScalarKind, Type, TypeInner, VectorSize};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Sint => write!(f, "sint"),
            Self::Uint => write!(f, "uint"),
            Self::Float => write!(f, "float"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Sint => write!(f, "i{}", self.width * 8),
            ScalarKind::Uint => write!(f, "u{}", self.width * 8),
            ScalarKind::Float => write!(f, "f{}", self.width * 8),
        }
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

impl fmt::Display for StorageAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let has_load = self.contains(StorageAccess::LOAD);
        let has_store = self.contains(StorageAccess::STORE);
        match (has_load, has_store) {
            (true, true) => write!(f, "read_write"),
            (true, false) => write!(f, "read"),
            (false, true) => write!(f, "write"),
            (false, false) => write!(f, "none"),
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Private => write!(f, "private"),
            Self::Workgroup => write!(f, "workgroup"),
            Self::Uniform => write!(f, "uniform"),
            Self::Storage { access } => write!(f, "storage, {access}"),
        }
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalInvocationId => write!(f, "global_invocation_id"),
            Self::LocalInvocationId => write!(f, "local_invocation_id"),
            Self::LocalInvocationIndex => write!(f, "local_invocation_index"),
            Self::WorkgroupId => write!(f, "workgroup_id"),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn(b) => write!(f, "@builtin({b})"),
            Self::Location { location } => write!(f, "@location({location})"),
        }
    }
}

impl fmt::Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}i"),
            Self::U32(v) => write!(f, "{v}u"),
            Self::F32(v) => write!(f, "{v}f"),
            Self::AbstractInt(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negate => write!(f, "-"),
            Self::LogicalNot => write!(f, "!"),
            Self::BitwiseNot => write!(f, "~"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Subtract => write!(f, "-"),
            Self::Multiply => write!(f, "*"),
            Self::Divide => write!(f, "/"),
            Self::Modulo => write!(f, "%"),
            Self::Equal => write!(f, "=="),
            Self::NotEqual => write!(f, "!="),
            Self::Less => write!(f, "<"),
            Self::LessEqual => write!(f, "<="),
            Self::Greater => write!(f, ">"),
            Self::GreaterEqual => write!(f, ">="),
            Self::LogicalAnd => write!(f, "&&"),
            Self::LogicalOr => write!(f, "||"),
            Self::BitwiseAnd => write!(f, "&"),
            Self::BitwiseOr => write!(f, "|"),
            Self::BitwiseXor => write!(f, "^"),
            Self::ShiftLeft => write!(f, "<<"),
            Self::ShiftRight => write!(f, ">>"),
        }
    }
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.contains(Barrier::STORAGE);
        let workgroup = self.contains(Barrier::WORKGROUP);
        match (storage, workgroup) {
            (true, true) => write!(f, "storageBarrier(); workgroupBarrier()"),
            (true, false) => write!(f, "storageBarrier()"),
            (false, true) => write!(f, "workgroupBarrier()"),
            (false, false) => write!(f, "/* no barrier */"),
        }
    }
}

/// Formats a type using the type arena for resolving inner references.
pub fn format_type(ty: &Type, types: &UniqueArena<Type>) -> String {
    if let Some(ref name) = ty.name {
        return name.clone();
    }
    format_type_inner(&ty.inner, types)
}

/// Formats a [`TypeInner`] using the type arena for resolving references.
pub fn format_type_inner(inner: &TypeInner, types: &UniqueArena<Type>) -> String {
    match inner {
        TypeInner::Scalar(s) => format!("{s}"),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Atomic(s) => format!("atomic<{s}>"),
        TypeInner::Pointer { base, space } => {
            let base_str = format_type(&types[*base], types);
            format!("ptr<{space}, {base_str}>")
        }
        TypeInner::Array { base, size, .. } => {
            let base_str = format_type(&types[*base], types);
            match size {
                ArraySize::Constant(n) => format!("array<{base_str}, {n}>"),
                ArraySize::Dynamic => format!("array<{base_str}>"),
            }
        }
        TypeInner::Struct { members, span } => {
            format!("struct({} members, span {span})", members.len())
        }
    }
}

/// Renders the expressions and statements of one function.
struct Printer<'a> {
    module: &'a Module,
    func: &'a Function,
}

impl Printer<'_> {
    fn ty(&self, ty: Handle<Type>) -> String {
        format_type(&self.module.types[ty], &self.module.types)
    }

    fn expr(&self, handle: Handle<Expression>) -> String {
        let join = |args: &[Handle<Expression>]| {
            args.iter()
                .map(|&a| self.expr(a))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.func.expressions[handle] {
            Expression::Literal(lit) => format!("{lit}"),
            Expression::Compose { ty, components } => {
                format!("{}({})", self.ty(*ty), join(components))
            }
            Expression::FunctionArgument(i) => self
                .func
                .arguments
                .get(*i as usize)
                .and_then(|a| a.name.clone())
                .unwrap_or_else(|| format!("arg{i}")),
            Expression::GlobalVariable(h) => self.module.global_variables[*h].name.clone(),
            Expression::LocalVariable(h) => self.func.local_variables[*h].name.clone(),
            Expression::AddressOf(e) => format!("&{}", self.expr(*e)),
            Expression::Deref(e) => format!("(*{})", self.expr(*e)),
            Expression::Access { base, index } => {
                format!("{}[{}]", self.expr(*base), self.expr(*index))
            }
            Expression::Member { base, name } => format!("{}.{name}", self.expr(*base)),
            Expression::Unary { op, expr } => format!("{op}{}", self.expr(*expr)),
            Expression::Binary { op, left, right } => {
                format!("({} {op} {})", self.expr(*left), self.expr(*right))
            }
            Expression::Select {
                condition,
                accept,
                reject,
            } => format!(
                "select({}, {}, {})",
                self.expr(*reject),
                self.expr(*accept),
                self.expr(*condition)
            ),
            Expression::As {
                expr,
                kind,
                convert,
            } => match convert {
                Some(width) => {
                    let scalar = Scalar {
                        kind: *kind,
                        width: *width,
                    };
                    format!("{scalar}({})", self.expr(*expr))
                }
                None => format!("bitcast<{kind}>({})", self.expr(*expr)),
            },
            Expression::ArrayLength(e) => format!("arrayLength({})", self.expr(*e)),
            Expression::Call {
                function,
                arguments,
            } => {
                let name = self
                    .module
                    .functions
                    .try_get(*function)
                    .map_or_else(|| format!("{function:?}"), |f| f.label().to_string());
                format!("{name}({})", join(arguments))
            }
        }
    }

    /// Formats a statement that fits on one line, without a trailing `;`.
    fn simple_stmt(&self, stmt: &Statement) -> String {
        match stmt {
            Statement::Local(h) => {
                let local = &self.func.local_variables[*h];
                let keyword = match local.kind {
                    LocalKind::Var => "var",
                    LocalKind::Let => "let",
                };
                let ty = local
                    .ty
                    .map(|t| format!(": {}", self.ty(t)))
                    .unwrap_or_default();
                let init = local
                    .init
                    .map(|e| format!(" = {}", self.expr(e)))
                    .unwrap_or_default();
                format!("{keyword} {}{ty}{init}", local.name)
            }
            Statement::Assign { target, value } => {
                format!("{} = {}", self.expr(*target), self.expr(*value))
            }
            Statement::Eval(e) => self.expr(*e),
            Statement::Break => "break".into(),
            Statement::Continue => "continue".into(),
            Statement::Return { value: Some(v) } => format!("return {}", self.expr(*v)),
            Statement::Return { value: None } => "return".into(),
            Statement::Barrier(b) => format!("{b}"),
            other => format!("/* {other:?} */"),
        }
    }

    fn block(&self, out: &mut String, block: &[Statement], indent: usize) {
        for stmt in block {
            self.stmt(out, stmt, indent);
        }
    }

    fn stmt(&self, out: &mut String, stmt: &Statement, indent: usize) {
        let pad = " ".repeat(indent);
        match stmt {
            Statement::If {
                condition,
                accept,
                reject,
            } => {
                let _ = writeln!(out, "{pad}if {} {{", self.expr(*condition));
                self.block(out, accept, indent + 4);
                if !reject.is_empty() {
                    let _ = writeln!(out, "{pad}}} else {{");
                    self.block(out, reject, indent + 4);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Statement::Loop {
                body,
                continuing,
                break_if,
            } => {
                let _ = writeln!(out, "{pad}loop {{");
                self.block(out, body, indent + 4);
                if !continuing.is_empty() || break_if.is_some() {
                    let _ = writeln!(out, "{pad}    continuing {{");
                    self.block(out, continuing, indent + 8);
                    if let Some(brk) = break_if {
                        let _ = writeln!(out, "{pad}        break if {};", self.expr(*brk));
                    }
                    let _ = writeln!(out, "{pad}    }}");
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = init
                    .as_deref()
                    .map(|s| self.simple_stmt(s))
                    .unwrap_or_default();
                let condition = condition.map(|c| self.expr(c)).unwrap_or_default();
                let update = update
                    .as_deref()
                    .map(|s| self.simple_stmt(s))
                    .unwrap_or_default();
                let _ = writeln!(out, "{pad}for ({init}; {condition}; {update}) {{");
                self.block(out, body, indent + 4);
                let _ = writeln!(out, "{pad}}}");
            }
            Statement::While { condition, body } => {
                let _ = writeln!(out, "{pad}while {} {{", self.expr(*condition));
                self.block(out, body, indent + 4);
                let _ = writeln!(out, "{pad}}}");
            }
            Statement::Block(block) => {
                let _ = writeln!(out, "{pad}{{");
                self.block(out, block, indent + 4);
                let _ = writeln!(out, "{pad}}}");
            }
            simple => {
                let _ = writeln!(out, "{pad}{};", self.simple_stmt(simple));
            }
        }
    }

    fn function(&self, out: &mut String, stage: Option<[u32; 3]>) {
        if let Some([x, y, z]) = stage {
            let _ = writeln!(out, "@compute @workgroup_size({x}, {y}, {z})");
        }
        let args: Vec<_> = self
            .func
            .arguments
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let binding = match &arg.binding {
                    Some(b) => format!("{b} "),
                    None => String::new(),
                };
                let name = arg.name.clone().unwrap_or_else(|| format!("arg{i}"));
                format!("{binding}{name}: {}", self.ty(arg.ty))
            })
            .collect();
        let ret = match &self.func.result {
            Some(r) => format!(" -> {}", self.ty(r.ty)),
            None => String::new(),
        };
        let _ = writeln!(
            out,
            "fn {}({}){ret} {{",
            self.func.label(),
            args.join(", ")
        );
        self.block(out, &self.func.body, 4);
        let _ = writeln!(out, "}}");
    }
}

/// Produces a WGSL-like text rendering of one function of `module`.
pub fn dump_function(module: &Module, func: &Function) -> String {
    let mut out = String::new();
    Printer { module, func }.function(&mut out, None);
    out
}

/// Produces a human-readable text dump of a [`Module`] for debugging.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();

    for (_, var) in module.global_variables.iter() {
        let ty_str = format_type(&module.types[var.ty], &module.types);
        let binding_str = match &var.binding {
            Some(b) => format!("{b} "),
            None => String::new(),
        };
        let _ = writeln!(
            out,
            "{binding_str}var<{}> {}: {ty_str};",
            var.space, var.name
        );
    }

    for (_, func) in module.functions.iter() {
        out.push('\n');
        Printer { module, func }.function(&mut out, None);
    }

    for ep in &module.entry_points {
        out.push('\n');
        Printer {
            module,
            func: &ep.function,
        }
        .function(&mut out, Some(ep.workgroup_size));
    }

    out
}
