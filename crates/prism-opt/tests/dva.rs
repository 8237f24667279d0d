mod common;

use common::{FnBuilder, ModuleBuilder, counter, occurrences, reader, storage_rw};
use prism_ir::{
    AddressSpace, BinaryOp, Function, LocalKind, LocalVariable, Module, Scalar, Statement,
    dump_function, dump_module,
};
use prism_opt::dva::{DvaError, Options, TraceError, transform};
use prism_opt::{PassManager, PointerParamValidation, direct_variable_access};

fn function_names(module: &Module) -> Vec<&str> {
    module.functions.iter().map(|(_, f)| f.label()).collect()
}

fn main_of(module: &Module) -> &Function {
    &module.entry_points[0].function
}

/// `U: array<vec4<i32>, 8>` read through `a(pre, &U[k], post)` with
/// k = 0, 1 and a runtime value.
fn uniform_vector_reads() -> Module {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let vec_ty = b.vec4(Scalar::I32);
    let arr_ty = b.array(vec_ty, 8);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let ptr_ty = b.pointer(vec_ty, AddressSpace::Uniform);

    let mut a = FnBuilder::new("a");
    a.param("pre", i32_ty);
    let p = a.param("p", ptr_ty);
    a.param("post", i32_ty);
    a.returns(vec_ty);
    let arg = a.arg(p);
    let load = a.deref(arg);
    a.ret(load);
    let a = b.function(a.finish());

    let mut main = FnBuilder::new("main");
    let three = main.i32(3);
    let i = main.var("I", i32_ty, Some(three));
    for constant in [Some(0), Some(1), None] {
        let pre = main.i32(10);
        let root = main.global(u);
        let index = match constant {
            Some(value) => main.int(value),
            None => main.read(i),
        };
        let elem = main.index(root, index);
        let ptr = main.addr(elem);
        let post = main.i32(20);
        let call = main.call(a, vec![pre, ptr, post]);
        main.eval(call);
    }
    b.entry_point(main.finish());
    b.finish()
}

#[test]
fn constant_and_runtime_indices_share_one_specialization() {
    let mut module = uniform_vector_reads();
    assert!(transform(&mut module, &Options::default()).unwrap());

    assert_eq!(
        dump_module(&module),
        "@group(0) @binding(0) var<uniform> U: array<vec4<i32>, 8>;\n\
         \n\
         fn a_U_X(pre: i32, p_indices: array<u32, 1>, post: i32) -> vec4<i32> {\n    \
         return U[p_indices[0u]];\n\
         }\n\
         \n\
         @compute @workgroup_size(1, 1, 1)\n\
         fn main() {\n    \
         var I: i32 = 3i;\n    \
         a_U_X(10i, array<u32, 1>(0u), 20i);\n    \
         a_U_X(10i, array<u32, 1>(1u), 20i);\n    \
         a_U_X(10i, array<u32, 1>(u32(I)), 20i);\n\
         }\n"
    );
}

#[test]
fn transform_is_idempotent() {
    let mut module = uniform_vector_reads();
    assert!(transform(&mut module, &Options::default()).unwrap());
    let once = dump_module(&module);

    assert!(!transform(&mut module, &Options::default()).unwrap());
    assert_eq!(dump_module(&module), once);
}

#[test]
fn nested_member_and_index_path() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let vec_ty = b.vec4(Scalar::F32);
    let mat_ty = b.mat4x4();
    let inner_ty = b.structure("Inner", &[("mat", mat_ty)]);
    let arr_ty = b.array(inner_ty, 4);
    let outer_ty = b.structure("Outer", &[("arr", arr_ty)]);
    let u = b.global("U", AddressSpace::Uniform, outer_ty);
    let read_column = reader(&mut b, "b", vec_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    let one = main.i32(1);
    let i = main.var("I", i32_ty, Some(one));
    let two = main.i32(2);
    let j = main.var("J", i32_ty, Some(two));
    let root = main.global(u);
    let arr = main.member(root, "arr");
    let i_read = main.read(i);
    let elem = main.index(arr, i_read);
    let mat = main.member(elem, "mat");
    let j_read = main.read(j);
    let column = main.index(mat, j_read);
    let ptr = main.addr(column);
    let call = main.call(read_column, vec![ptr]);
    main.eval(call);
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(function_names(&module), vec!["b_U_arr_X_mat_X"]);
    let (_, clone) = module.functions.iter().next().unwrap();
    assert_eq!(
        dump_function(&module, clone),
        "fn b_U_arr_X_mat_X(p_indices: array<u32, 2>) -> vec4<f32> {\n    \
         return U.arr[p_indices[0u]].mat[p_indices[1u]];\n\
         }\n"
    );
    assert!(
        dump_function(&module, main_of(&module))
            .contains("    b_U_arr_X_mat_X(array<u32, 2>(u32(I), u32(J)));\n")
    );
}

/// `fN(p) { return fN+1(&(*p)[k]); }`, ending in a plain read.
fn forwarder(
    b: &mut ModuleBuilder,
    name: &str,
    pointee: prism_ir::Handle<prism_ir::Type>,
    callee: prism_ir::Handle<Function>,
    index: i64,
) -> prism_ir::Handle<Function> {
    let i32_ty = b.scalar(Scalar::I32);
    let ptr_ty = b.pointer(pointee, storage_rw());
    let mut f = FnBuilder::new(name);
    let p = f.param("p", ptr_ty);
    f.returns(i32_ty);
    let arg = f.arg(p);
    let base = f.deref(arg);
    let k = f.int(index);
    let elem = f.index(base, k);
    let ptr = f.addr(elem);
    let call = f.call(callee, vec![ptr]);
    f.ret(call);
    b.function(f.finish())
}

#[test]
fn call_chain_forwards_index_slots() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let a1 = b.array(i32_ty, 4);
    let a2 = b.array(a1, 4);
    let a3 = b.array(a2, 4);
    let a4 = b.array(a3, 4);
    let s = b.global("S", storage_rw(), a4);
    let f3 = reader(&mut b, "f3", i32_ty, storage_rw());
    let f2 = forwarder(&mut b, "f2", a1, f3, 3);
    let f1 = forwarder(&mut b, "f1", a2, f2, 2);
    let f0 = forwarder(&mut b, "f0", a3, f1, 1);

    let mut main = FnBuilder::new("main");
    let zero = main.i32(0);
    let i = main.var("I", i32_ty, Some(zero));
    let root = main.global(s);
    let i_read = main.read(i);
    let elem = main.index(root, i_read);
    let ptr = main.addr(elem);
    let call = main.call(f0, vec![ptr]);
    main.eval(call);
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());

    // Callees are emitted before their callers.
    assert_eq!(
        function_names(&module),
        vec!["f3_S_X_X_X_X", "f2_S_X_X_X", "f1_S_X_X", "f0_S_X"]
    );
    let dumps: Vec<String> = module
        .functions
        .iter()
        .map(|(_, f)| dump_function(&module, f))
        .collect();
    assert_eq!(
        dumps[0],
        "fn f3_S_X_X_X_X(p_indices: array<u32, 4>) -> i32 {\n    \
         return S[p_indices[0u]][p_indices[1u]][p_indices[2u]][p_indices[3u]];\n\
         }\n"
    );
    assert_eq!(
        dumps[1],
        "fn f2_S_X_X_X(p_indices: array<u32, 3>) -> i32 {\n    \
         return f3_S_X_X_X_X(array<u32, 4>(p_indices[0u], p_indices[1u], p_indices[2u], 3u));\n\
         }\n"
    );
    assert_eq!(
        dumps[2],
        "fn f1_S_X_X(p_indices: array<u32, 2>) -> i32 {\n    \
         return f2_S_X_X_X(array<u32, 3>(p_indices[0u], p_indices[1u], 2u));\n\
         }\n"
    );
    assert_eq!(
        dumps[3],
        "fn f0_S_X(p_indices: array<u32, 1>) -> i32 {\n    \
         return f1_S_X_X(array<u32, 2>(p_indices[0u], 1u));\n\
         }\n"
    );
    assert!(
        dump_function(&module, main_of(&module)).contains("    f0_S_X(array<u32, 1>(u32(I)));\n")
    );
}

struct SideEffects {
    builder: ModuleBuilder,
    u: prism_ir::Handle<prism_ir::GlobalVariable>,
    first: prism_ir::Handle<Function>,
    second: prism_ir::Handle<Function>,
    read: prism_ir::Handle<Function>,
}

fn side_effects() -> SideEffects {
    let mut builder = ModuleBuilder::new();
    let i32_ty = builder.scalar(Scalar::I32);
    let row = builder.array(i32_ty, 4);
    let grid = builder.array(row, 4);
    let u = builder.global("U", AddressSpace::Uniform, grid);
    let first = counter(&mut builder, "first", 0);
    let second = counter(&mut builder, "second", 1);
    let read = reader(&mut builder, "d", i32_ty, AddressSpace::Uniform);
    SideEffects {
        builder,
        u,
        first,
        second,
        read,
    }
}

/// `&U[first()][second()]`
fn side_effecting_pointer(
    main: &mut FnBuilder,
    fixture: &SideEffects,
) -> prism_ir::Handle<prism_ir::Expression> {
    let root = main.global(fixture.u);
    let first = main.call(fixture.first, vec![]);
    let row = main.index(root, first);
    let second = main.call(fixture.second, vec![]);
    let elem = main.index(row, second);
    main.addr(elem)
}

const HOISTED_WHILE: &str = "fn main() {\n    \
     let ptr_index_save = first();\n    \
     let ptr_index_save_1 = second();\n    \
     while (d_U_X_X(array<u32, 2>(u32(ptr_index_save), u32(ptr_index_save_1))) < 10i) {\n        \
     break;\n    \
     }\n\
     }\n";

#[test]
fn side_effecting_indices_in_loop_condition_are_hoisted_once() {
    let mut fixture = side_effects();
    let mut main = FnBuilder::new("main");
    let ptr = side_effecting_pointer(&mut main, &fixture);
    let call = main.call(fixture.read, vec![ptr]);
    let ten = main.i32(10);
    let cond = main.binary(BinaryOp::Less, call, ten);
    main.push(Statement::While {
        condition: cond,
        body: vec![Statement::Break],
    });
    fixture.builder.entry_point(main.finish());
    let mut module = fixture.builder.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    let dump = dump_function(&module, main_of(&module));
    assert_eq!(dump, HOISTED_WHILE);
    assert_eq!(occurrences(&dump, "first()"), 1);
    assert_eq!(occurrences(&dump, "second()"), 1);
}

#[test]
fn side_effecting_indices_behind_alias_are_hoisted_at_construction() {
    let mut fixture = side_effects();
    let mut main = FnBuilder::new("main");
    let ptr = side_effecting_pointer(&mut main, &fixture);
    let p = main.let_("p", ptr);
    let p_read = main.read(p);
    let call = main.call(fixture.read, vec![p_read]);
    let ten = main.i32(10);
    let cond = main.binary(BinaryOp::Less, call, ten);
    main.push(Statement::While {
        condition: cond,
        body: vec![Statement::Break],
    });
    fixture.builder.entry_point(main.finish());
    let mut module = fixture.builder.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    // The alias has no reader left and is gone.
    assert_eq!(dump_function(&module, main_of(&module)), HOISTED_WHILE);
}

#[test]
fn for_condition_index_is_hoisted_before_the_loop() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let next = counter(&mut b, "next", 1);
    let read = reader(&mut b, "d", i32_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    let zero = main.i32(0);
    let i = main.func.local_variables.append(LocalVariable {
        name: "i".into(),
        kind: LocalKind::Var,
        ty: None,
        init: Some(zero),
    });
    let i_read = main.read(i);
    let root = main.global(u);
    let n = main.call(next, vec![]);
    let elem = main.index(root, n);
    let ptr = main.addr(elem);
    let bound = main.call(read, vec![ptr]);
    let cond = main.binary(BinaryOp::Less, i_read, bound);
    let target = main.read(i);
    let again = main.read(i);
    let one = main.i32(1);
    let sum = main.binary(BinaryOp::Add, again, one);
    main.push(Statement::For {
        init: Some(Box::new(Statement::Local(i))),
        condition: Some(cond),
        update: Some(Box::new(Statement::Assign { target, value: sum })),
        body: vec![],
    });
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         {\n        \
         var i = 0i;\n        \
         let ptr_index_save = next();\n        \
         loop {\n            \
         if !(i < d_U_X(array<u32, 1>(u32(ptr_index_save)))) {\n                \
         break;\n            \
         }\n            \
         continuing {\n                \
         i = (i + 1i);\n            \
         }\n        \
         }\n    \
         }\n\
         }\n"
    );
}

#[test]
fn for_update_index_is_hoisted_before_the_loop() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let next = counter(&mut b, "next", 1);
    let read = reader(&mut b, "d", i32_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    let root = main.global(u);
    let n = main.call(next, vec![]);
    let elem = main.index(root, n);
    let ptr = main.addr(elem);
    let call = main.call(read, vec![ptr]);
    main.push(Statement::For {
        init: None,
        condition: None,
        update: Some(Box::new(Statement::Eval(call))),
        body: vec![Statement::Break],
    });
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         let ptr_index_save = next();\n    \
         for (; ; d_U_X(array<u32, 1>(u32(ptr_index_save)))) {\n        \
         break;\n    \
         }\n\
         }\n"
    );
}

#[test]
fn uncalled_generic_function_is_removed() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    b.global("S", storage_rw(), i32_ty);
    reader(&mut b, "e", i32_ty, storage_rw());
    counter(&mut b, "unused", 7);
    b.entry_point(FnBuilder::new("main").finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    let dump = dump_module(&module);
    assert!(!dump.contains("fn e("));
    // Functions outside the affected set survive even when nothing calls them.
    assert_eq!(function_names(&module), vec!["unused"]);
    assert_eq!(module.entry_points.len(), 1);
}

#[test]
fn member_paths_select_distinct_specializations() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let fields = b.structure("Fields", &[("a", i32_ty), ("b", i32_ty)]);
    let u = b.global("U", AddressSpace::Uniform, fields);
    let read = reader(&mut b, "f", i32_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    for field in ["a", "b", "a"] {
        let root = main.global(u);
        let member = main.member(root, field);
        let ptr = main.addr(member);
        let call = main.call(read, vec![ptr]);
        main.eval(call);
    }
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(function_names(&module), vec!["f_U_a", "f_U_b"]);
    let (_, f_a) = module.functions.iter().next().unwrap();
    // Member steps never become index slots.
    assert_eq!(
        dump_function(&module, f_a),
        "fn f_U_a() -> i32 {\n    return U.a;\n}\n"
    );
    let main_dump = dump_function(&module, main_of(&module));
    assert_eq!(occurrences(&main_dump, "f_U_a();"), 2);
    assert_eq!(occurrences(&main_dump, "f_U_b();"), 1);
}

fn private_array_read() -> Module {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let p = b.global("P", AddressSpace::Private, arr_ty);
    let read = reader(&mut b, "g", i32_ty, AddressSpace::Private);

    let mut main = FnBuilder::new("main");
    let two = main.i32(2);
    let i = main.var("I", i32_ty, Some(two));
    let root = main.global(p);
    let i_read = main.read(i);
    let elem = main.index(root, i_read);
    let ptr = main.addr(elem);
    let call = main.call(read, vec![ptr]);
    main.eval(call);
    b.entry_point(main.finish());
    b.finish()
}

#[test]
fn private_root_is_passed_as_pointer() {
    let mut module = private_array_read();
    let options = Options {
        transform_private: true,
        ..Options::default()
    };
    assert!(transform(&mut module, &options).unwrap());

    let (_, clone) = module.functions.iter().next().unwrap();
    assert_eq!(
        dump_function(&module, clone),
        "fn g_P_X(p_base: ptr<private, array<i32, 4>>, p_indices: array<u32, 1>) -> i32 {\n    \
         return (*p_base)[p_indices[0u]];\n\
         }\n"
    );
    assert!(
        dump_function(&module, main_of(&module))
            .contains("    g_P_X(&P, array<u32, 1>(u32(I)));\n")
    );
}

#[test]
fn private_pointers_are_left_alone_by_default() {
    let mut module = private_array_read();
    let before = dump_module(&module);
    assert!(!transform(&mut module, &Options::default()).unwrap());
    assert_eq!(dump_module(&module), before);
}

#[test]
fn function_root_is_forwarded_through_callers() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let inner = reader(&mut b, "inner", i32_ty, AddressSpace::Function);

    let arr_ptr = b.pointer(arr_ty, AddressSpace::Function);
    let mut outer = FnBuilder::new("outer");
    let p = outer.param("p", arr_ptr);
    outer.returns(i32_ty);
    let arg = outer.arg(p);
    let base = outer.deref(arg);
    let two = outer.int(2);
    let elem = outer.index(base, two);
    let ptr = outer.addr(elem);
    let call = outer.call(inner, vec![ptr]);
    outer.ret(call);
    let outer = b.function(outer.finish());

    let mut main = FnBuilder::new("main");
    let arr = main.var("arr", arr_ty, None);
    let arr_ref = main.read(arr);
    let ptr = main.addr(arr_ref);
    let call = main.call(outer, vec![ptr]);
    main.eval(call);
    b.entry_point(main.finish());
    let mut module = b.finish();

    let options = Options {
        transform_function: true,
        ..Options::default()
    };
    assert!(transform(&mut module, &options).unwrap());
    let dump = dump_module(&module);
    assert!(dump.contains(
        "fn inner_F_X(p_base: ptr<function, array<i32, 4>>, p_indices: array<u32, 1>) -> i32 {\n    \
         return (*p_base)[p_indices[0u]];\n\
         }\n"
    ));
    assert!(dump.contains(
        "fn outer_F(p_base: ptr<function, array<i32, 4>>) -> i32 {\n    \
         return inner_F_X(p_base, array<u32, 1>(2u));\n\
         }\n"
    ));
    assert!(dump.contains("    var arr: array<i32, 4>;\n    outer_F(&arr);\n"));

    // Root pointer parameters of specializations are not specialized again.
    assert!(!transform(&mut module, &options).unwrap());
    direct_variable_access(&mut module, &options).unwrap();
    assert_eq!(dump_module(&module), dump);
}

/// `let p = &U[<index>]; load(p);`
fn aliased_read(stable_index: bool) -> Module {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let read = reader(&mut b, "load", i32_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    let three = main.i32(3);
    let index = if stable_index {
        let k = main.let_("k", three);
        main.read(k)
    } else {
        let i = main.var("I", i32_ty, Some(three));
        main.read(i)
    };
    let root = main.global(u);
    let elem = main.index(root, index);
    let ptr = main.addr(elem);
    let p = main.let_("p", ptr);
    let p_read = main.read(p);
    let call = main.call(read, vec![p_read]);
    main.eval(call);
    b.entry_point(main.finish());
    b.finish()
}

#[test]
fn mutable_index_read_through_alias_is_snapshotted() {
    let mut module = aliased_read(false);
    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         var I: i32 = 3i;\n    \
         let ptr_index_save = I;\n    \
         load_U_X(array<u32, 1>(u32(ptr_index_save)));\n\
         }\n"
    );
}

#[test]
fn immutable_index_read_through_alias_is_reused() {
    let mut module = aliased_read(true);
    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         let k = 3i;\n    \
         load_U_X(array<u32, 1>(u32(k)));\n\
         }\n"
    );
}

/// Two bodies each passing the result of `get_ptr()` to `f`.
fn opaque_pointer_source() -> Module {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let s = b.global("S", storage_rw(), i32_ty);
    let ptr_ty = b.pointer(i32_ty, storage_rw());
    let mut get_ptr = FnBuilder::new("get_ptr");
    get_ptr.returns(ptr_ty);
    let root = get_ptr.global(s);
    let ptr = get_ptr.addr(root);
    get_ptr.ret(ptr);
    let get_ptr = b.function(get_ptr.finish());
    let read = reader(&mut b, "f", i32_ty, storage_rw());

    for name in ["h", "main"] {
        let mut body = FnBuilder::new(name);
        let ptr = body.call(get_ptr, vec![]);
        let call = body.call(read, vec![ptr]);
        body.eval(call);
        if name == "main" {
            b.entry_point(body.finish());
        } else {
            b.function(body.finish());
        }
    }
    b.finish()
}

#[test]
fn unresolvable_pointer_rejects_the_module() {
    let mut module = opaque_pointer_source();
    let before = dump_module(&module);

    let err = transform(&mut module, &Options::default()).unwrap_err();
    let DvaError::Unresolved(calls) = &err else {
        panic!("expected unresolved calls, got {err:?}");
    };
    // Every offending call site is reported, not just the first.
    let mut callers: Vec<&str> = calls.iter().map(|c| c.caller.as_str()).collect();
    callers.sort_unstable();
    assert_eq!(callers, vec!["h", "main"]);
    for call in calls {
        assert_eq!(call.callee, "f");
        assert_eq!(call.argument, 0);
        assert_eq!(call.reason, TraceError::CallResult("get_ptr".into()));
    }
    assert!(err.to_string().contains("pointer is produced by a call to 'get_ptr'"));
    assert_eq!(dump_module(&module), before);
}

#[test]
fn pass_pipeline_reports_failing_pass() {
    let mut module = opaque_pointer_source();
    let err = direct_variable_access(&mut module, &Options::default()).unwrap_err();
    assert_eq!(err.pass, "direct-variable-access");
    assert!(matches!(err.source, DvaError::Unresolved(ref calls) if calls.len() == 2));
}

#[test]
fn pass_pipeline_transforms_and_validates() {
    let mut module = uniform_vector_reads();
    direct_variable_access(&mut module, &Options::default()).unwrap();
    assert_eq!(function_names(&module), vec!["a_U_X"]);

    // A second pipeline run over the output finds nothing to do.
    let before = dump_module(&module);
    let mut pm = PassManager::new();
    pm.add_pass(Box::new(PointerParamValidation));
    pm.run(&mut module).unwrap();
    assert_eq!(dump_module(&module), before);
}

/// `U` and `W` of `array<i32, 4>`, the side-effecting helpers `a`, `b`, `c`
/// and `n`, and `d(p: ptr<uniform, i32>)`.
struct Ordered {
    builder: ModuleBuilder,
    u: prism_ir::Handle<prism_ir::GlobalVariable>,
    w: prism_ir::Handle<prism_ir::GlobalVariable>,
    helpers: [prism_ir::Handle<Function>; 4],
    read: prism_ir::Handle<Function>,
}

fn ordered() -> Ordered {
    let mut builder = ModuleBuilder::new();
    let i32_ty = builder.scalar(Scalar::I32);
    let arr_ty = builder.array(i32_ty, 4);
    let u = builder.global("U", AddressSpace::Uniform, arr_ty);
    let w = builder.global("W", storage_rw(), arr_ty);
    let helpers = ["a", "b", "c", "n"].map(|name| counter(&mut builder, name, 1));
    let read = reader(&mut builder, "d", i32_ty, AddressSpace::Uniform);
    Ordered {
        builder,
        u,
        w,
        helpers,
        read,
    }
}

#[test]
fn assignment_target_side_effects_keep_their_order() {
    let mut fixture = ordered();
    let [a, b, ..] = fixture.helpers;
    let mut main = FnBuilder::new("main");
    let w = main.global(fixture.w);
    let first = main.call(a, vec![]);
    let target = main.index(w, first);
    let root = main.global(fixture.u);
    let second = main.call(b, vec![]);
    let elem = main.index(root, second);
    let ptr = main.addr(elem);
    let value = main.call(fixture.read, vec![ptr]);
    main.push(Statement::Assign { target, value });
    fixture.builder.entry_point(main.finish());
    let mut module = fixture.builder.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         let ptr_index_save = a();\n    \
         let ptr_index_save_1 = b();\n    \
         W[ptr_index_save] = d_U_X(array<u32, 1>(u32(ptr_index_save_1)));\n\
         }\n"
    );
}

#[test]
fn short_circuit_operand_stays_conditional() {
    let mut fixture = ordered();
    let [_, _, c, n] = fixture.helpers;
    let mut main = FnBuilder::new("main");
    let left = main.call(c, vec![]);
    let root = main.global(fixture.u);
    let index = main.call(n, vec![]);
    let elem = main.index(root, index);
    let ptr = main.addr(elem);
    let call = main.call(fixture.read, vec![ptr]);
    let one = main.i32(1);
    let right = main.binary(BinaryOp::Less, call, one);
    let condition = main.binary(BinaryOp::LogicalAnd, left, right);
    main.push(Statement::If {
        condition,
        accept: vec![],
        reject: vec![],
    });
    fixture.builder.entry_point(main.finish());
    let mut module = fixture.builder.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    let dump = dump_function(&module, main_of(&module));
    assert_eq!(
        dump,
        "fn main() {\n    \
         var ptr_index_save = c();\n    \
         if ptr_index_save {\n        \
         let ptr_index_save_1 = n();\n        \
         ptr_index_save = (d_U_X(array<u32, 1>(u32(ptr_index_save_1))) < 1i);\n    \
         }\n    \
         if ptr_index_save {\n    \
         }\n\
         }\n"
    );
    assert_eq!(occurrences(&dump, "n()"), 1);
}

#[test]
fn short_circuit_in_while_condition_runs_every_iteration() {
    let mut fixture = ordered();
    let [_, _, c, n] = fixture.helpers;
    let mut main = FnBuilder::new("main");
    let left = main.call(c, vec![]);
    let root = main.global(fixture.u);
    let index = main.call(n, vec![]);
    let elem = main.index(root, index);
    let ptr = main.addr(elem);
    let call = main.call(fixture.read, vec![ptr]);
    let one = main.i32(1);
    let right = main.binary(BinaryOp::Less, call, one);
    let condition = main.binary(BinaryOp::LogicalOr, left, right);
    main.push(Statement::While {
        condition,
        body: vec![Statement::Break],
    });
    fixture.builder.entry_point(main.finish());
    let mut module = fixture.builder.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         loop {\n        \
         var ptr_index_save = c();\n        \
         if !ptr_index_save {\n            \
         let ptr_index_save_1 = n();\n            \
         ptr_index_save = (d_U_X(array<u32, 1>(u32(ptr_index_save_1))) < 1i);\n        \
         }\n        \
         if !ptr_index_save {\n            \
         break;\n        \
         }\n        \
         break;\n    \
         }\n\
         }\n"
    );
}

#[test]
fn shape_tuples_key_specializations() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let s = b.global("S", storage_rw(), arr_ty);
    let t = b.global("T", storage_rw(), arr_ty);
    let uniform_ptr = b.pointer(i32_ty, AddressSpace::Uniform);
    let storage_ptr = b.pointer(i32_ty, storage_rw());

    // fn f(p: ptr<uniform, i32>, k: i32, q: ptr<storage, i32, read_write>) -> i32
    let mut f = FnBuilder::new("f");
    let p = f.param("p", uniform_ptr);
    let k = f.param("k", i32_ty);
    let q = f.param("q", storage_ptr);
    f.returns(i32_ty);
    let p_arg = f.arg(p);
    let p_load = f.deref(p_arg);
    let k_arg = f.arg(k);
    let sum = f.binary(BinaryOp::Add, p_load, k_arg);
    let q_arg = f.arg(q);
    let q_load = f.deref(q_arg);
    let total = f.binary(BinaryOp::Add, sum, q_load);
    f.ret(total);
    let f = b.function(f.finish());

    let mut main = FnBuilder::new("main");
    for (first, scalar, second, var) in [(0, 10, 1, s), (2, 20, 3, t), (2, 30, 3, s)] {
        let u_root = main.global(u);
        let u_index = main.int(first);
        let u_elem = main.index(u_root, u_index);
        let u_ptr = main.addr(u_elem);
        let scalar = main.i32(scalar);
        let root = main.global(var);
        let index = main.int(second);
        let elem = main.index(root, index);
        let ptr = main.addr(elem);
        let call = main.call(f, vec![u_ptr, scalar, ptr]);
        main.eval(call);
    }
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    // Calls that differ only in their second pointer get distinct clones.
    assert_eq!(function_names(&module), vec!["f_U_X_S_X", "f_U_X_T_X"]);
    let (_, clone) = module.functions.iter().next().unwrap();
    assert_eq!(
        dump_function(&module, clone),
        "fn f_U_X_S_X(p_indices: array<u32, 1>, k: i32, q_indices: array<u32, 1>) -> i32 {\n    \
         return ((U[p_indices[0u]] + k) + S[q_indices[0u]]);\n\
         }\n"
    );
    let main_dump = dump_function(&module, main_of(&module));
    assert!(main_dump.contains("f_U_X_S_X(array<u32, 1>(0u), 10i, array<u32, 1>(1u));"));
    assert!(main_dump.contains("f_U_X_T_X(array<u32, 1>(2u), 20i, array<u32, 1>(3u));"));
    assert!(main_dump.contains("f_U_X_S_X(array<u32, 1>(2u), 30i, array<u32, 1>(3u));"));
}

#[test]
fn alias_declared_in_for_init_is_pruned() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let read = reader(&mut b, "d", i32_ty, AddressSpace::Uniform);

    let mut main = FnBuilder::new("main");
    let root = main.global(u);
    let one = main.i32(1);
    let elem = main.index(root, one);
    let ptr = main.addr(elem);
    let p = main.func.local_variables.append(LocalVariable {
        name: "p".into(),
        kind: LocalKind::Let,
        ty: None,
        init: Some(ptr),
    });
    let p_read = main.read(p);
    let call = main.call(read, vec![p_read]);
    main.push(Statement::For {
        init: Some(Box::new(Statement::Local(p))),
        condition: None,
        update: None,
        body: vec![Statement::Eval(call), Statement::Break],
    });
    b.entry_point(main.finish());
    let mut module = b.finish();

    assert!(transform(&mut module, &Options::default()).unwrap());
    assert_eq!(
        dump_function(&module, main_of(&module)),
        "fn main() {\n    \
         for (; ; ) {\n        \
         d_U_X(array<u32, 1>(1u));\n        \
         break;\n    \
         }\n\
         }\n"
    );
}

#[test]
fn negative_constant_index_rejects_the_module() {
    let mut b = ModuleBuilder::new();
    let i32_ty = b.scalar(Scalar::I32);
    let arr_ty = b.array(i32_ty, 4);
    let u = b.global("U", AddressSpace::Uniform, arr_ty);
    let read = reader(&mut b, "d", i32_ty, AddressSpace::Uniform);
    let mut main = FnBuilder::new("main");
    let root = main.global(u);
    let minus_one = main.i32(-1);
    let elem = main.index(root, minus_one);
    let ptr = main.addr(elem);
    let call = main.call(read, vec![ptr]);
    main.eval(call);
    b.entry_point(main.finish());
    let mut module = b.finish();
    let before = dump_module(&module);

    let err = transform(&mut module, &Options::default()).unwrap_err();
    let DvaError::Unresolved(calls) = &err else {
        panic!("expected unresolved calls, got {err:?}");
    };
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].reason, TraceError::IndexOutOfRange(-1));
    assert_eq!(dump_module(&module), before);
}
