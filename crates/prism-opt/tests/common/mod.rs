use prism_ir::{
    AddressSpace, ArraySize, BinaryOp, EntryPoint, Expression, Function, FunctionArgument,
    FunctionResult, GlobalVariable, Handle, LocalKind, LocalVariable, Literal, Module,
    ResourceBinding, Scalar, Statement, StorageAccess, StructMember, Type, TypeInner,
    VectorSize, pointer_type,
};

#[allow(dead_code)]
pub fn storage_rw() -> AddressSpace {
    AddressSpace::Storage {
        access: StorageAccess::LOAD | StorageAccess::STORE,
    }
}

/// Builds a module declaration by declaration.
#[derive(Default)]
pub struct ModuleBuilder {
    pub module: Module,
    next_binding: u32,
}

#[allow(dead_code)]
impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(&mut self, scalar: Scalar) -> Handle<Type> {
        self.module
            .types
            .insert(Type::anonymous(TypeInner::Scalar(scalar)))
    }

    pub fn vec4(&mut self, scalar: Scalar) -> Handle<Type> {
        self.module.types.insert(Type::anonymous(TypeInner::Vector {
            size: VectorSize::Quad,
            scalar,
        }))
    }

    pub fn mat4x4(&mut self) -> Handle<Type> {
        self.module.types.insert(Type::anonymous(TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar: Scalar::F32,
        }))
    }

    pub fn array(&mut self, base: Handle<Type>, len: u32) -> Handle<Type> {
        self.module.types.insert(Type::anonymous(TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            stride: 16,
        }))
    }

    pub fn structure(&mut self, name: &str, members: &[(&str, Handle<Type>)]) -> Handle<Type> {
        let members = members
            .iter()
            .enumerate()
            .map(|(i, &(name, ty))| StructMember {
                name: name.into(),
                ty,
                offset: i as u32 * 16,
            })
            .collect::<Vec<_>>();
        let span = members.len() as u32 * 16;
        self.module.types.insert(Type {
            name: Some(name.into()),
            inner: TypeInner::Struct { members, span },
        })
    }

    pub fn pointer(&mut self, base: Handle<Type>, space: AddressSpace) -> Handle<Type> {
        pointer_type(&mut self.module.types, base, space)
    }

    /// Declares a module variable; shared spaces get the next binding slot.
    pub fn global(
        &mut self,
        name: &str,
        space: AddressSpace,
        ty: Handle<Type>,
    ) -> Handle<GlobalVariable> {
        let binding = space.is_shared() && space != AddressSpace::Workgroup;
        let binding = binding.then(|| {
            self.next_binding += 1;
            ResourceBinding {
                group: 0,
                binding: self.next_binding - 1,
            }
        });
        self.module.global_variables.append(GlobalVariable {
            name: name.into(),
            space,
            binding,
            ty,
        })
    }

    pub fn function(&mut self, func: Function) -> Handle<Function> {
        self.module.functions.append(func)
    }

    pub fn entry_point(&mut self, func: Function) {
        self.module.entry_points.push(EntryPoint {
            name: func.label().to_string(),
            workgroup_size: [1, 1, 1],
            function: func,
        });
    }

    pub fn finish(self) -> Module {
        self.module
    }
}

/// Builds one function body. Every helper appends a fresh expression node.
pub struct FnBuilder {
    pub func: Function,
}

#[allow(dead_code)]
impl FnBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: Function::new(name),
        }
    }

    /// Declares a parameter and returns its index.
    pub fn param(&mut self, name: &str, ty: Handle<Type>) -> u32 {
        self.func.arguments.push(FunctionArgument {
            name: Some(name.into()),
            ty,
            binding: None,
        });
        self.func.arguments.len() as u32 - 1
    }

    pub fn returns(&mut self, ty: Handle<Type>) {
        self.func.result = Some(FunctionResult { ty, binding: None });
    }

    fn expr(&mut self, expr: Expression) -> Handle<Expression> {
        self.func.expressions.append(expr)
    }

    pub fn arg(&mut self, index: u32) -> Handle<Expression> {
        self.expr(Expression::FunctionArgument(index))
    }

    pub fn global(&mut self, var: Handle<GlobalVariable>) -> Handle<Expression> {
        self.expr(Expression::GlobalVariable(var))
    }

    pub fn read(&mut self, local: Handle<LocalVariable>) -> Handle<Expression> {
        self.expr(Expression::LocalVariable(local))
    }

    pub fn i32(&mut self, value: i32) -> Handle<Expression> {
        self.expr(Expression::Literal(Literal::I32(value)))
    }

    pub fn int(&mut self, value: i64) -> Handle<Expression> {
        self.expr(Expression::Literal(Literal::AbstractInt(value)))
    }

    pub fn addr(&mut self, target: Handle<Expression>) -> Handle<Expression> {
        self.expr(Expression::AddressOf(target))
    }

    pub fn deref(&mut self, pointer: Handle<Expression>) -> Handle<Expression> {
        self.expr(Expression::Deref(pointer))
    }

    pub fn index(
        &mut self,
        base: Handle<Expression>,
        index: Handle<Expression>,
    ) -> Handle<Expression> {
        self.expr(Expression::Access { base, index })
    }

    pub fn member(&mut self, base: Handle<Expression>, name: &str) -> Handle<Expression> {
        self.expr(Expression::Member {
            base,
            name: name.into(),
        })
    }

    pub fn binary(
        &mut self,
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    ) -> Handle<Expression> {
        self.expr(Expression::Binary { op, left, right })
    }

    pub fn call(
        &mut self,
        function: Handle<Function>,
        arguments: Vec<Handle<Expression>>,
    ) -> Handle<Expression> {
        self.expr(Expression::Call {
            function,
            arguments,
        })
    }

    /// `var name: ty = init;`
    pub fn var(
        &mut self,
        name: &str,
        ty: Handle<Type>,
        init: Option<Handle<Expression>>,
    ) -> Handle<LocalVariable> {
        let local = self.func.local_variables.append(LocalVariable {
            name: name.into(),
            kind: LocalKind::Var,
            ty: Some(ty),
            init,
        });
        self.func.body.push(Statement::Local(local));
        local
    }

    /// `let name = init;`
    pub fn let_(&mut self, name: &str, init: Handle<Expression>) -> Handle<LocalVariable> {
        let local = self.func.local_variables.append(LocalVariable {
            name: name.into(),
            kind: LocalKind::Let,
            ty: None,
            init: Some(init),
        });
        self.func.body.push(Statement::Local(local));
        local
    }

    pub fn eval(&mut self, expr: Handle<Expression>) {
        self.func.body.push(Statement::Eval(expr));
    }

    pub fn ret(&mut self, value: Handle<Expression>) {
        self.func.body.push(Statement::Return { value: Some(value) });
    }

    pub fn push(&mut self, stmt: Statement) {
        self.func.body.push(stmt);
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

/// `fn name() -> i32 { return value; }`, a helper whose calls have side effects.
#[allow(dead_code)]
pub fn counter(builder: &mut ModuleBuilder, name: &str, value: i32) -> Handle<Function> {
    let i32_ty = builder.scalar(Scalar::I32);
    let mut f = FnBuilder::new(name);
    f.returns(i32_ty);
    let v = f.i32(value);
    f.ret(v);
    builder.function(f.finish())
}

/// `fn name(p: ptr<space, ty>) -> ty { return *p; }`
#[allow(dead_code)]
pub fn reader(
    builder: &mut ModuleBuilder,
    name: &str,
    ty: Handle<Type>,
    space: AddressSpace,
) -> Handle<Function> {
    let ptr_ty = builder.pointer(ty, space);
    let mut f = FnBuilder::new(name);
    let p = f.param("p", ptr_ty);
    f.returns(ty);
    let arg = f.arg(p);
    let load = f.deref(arg);
    f.ret(load);
    builder.function(f.finish())
}

/// Counts occurrences of `needle` in `haystack`.
#[allow(dead_code)]
pub fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
