use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use mido::{BuiltInError, BuiltIns, CompileEnv, CompilerConfig, Object, VM, standard_builtins};

const TOKENS: &[&str] = &[
    "Bow",
    "Slingshot",
    "Bombs",
    "Hookshot",
    "Hover_Boots",
    "Megaton_Hammer",
    "Progressive_Strength_Upgrade",
    "Silver_Gauntlets",
];

/// A mix of junctions, quantity checks and host calls.
const RULE: &str = "
    (is_adult and (Hookshot or Hover_Boots) and has(Progressive_Strength_Upgrade, 2))
    or (is_child and Slingshot and (Bombs or Megaton_Hammer))
    or (Bow and Silver_Gauntlets and has_hearts(3))
";

fn env() -> CompileEnv {
    let mut env = CompileEnv::new(CompilerConfig::default());
    env.with_builtins(standard_builtins())
        .unwrap()
        .with_tokens(TOKENS.iter().copied())
        .unwrap();
    env
}

fn compile_rule(bench: &mut Bencher) {
    let mut env = env();
    bench.iter(|| black_box(env.compile(black_box(RULE)).unwrap()));
}

fn execute_rule(bench: &mut Bencher) {
    let mut env = env();
    let code = env.compile(RULE).unwrap();
    let table = env.freeze();

    let mut builtins = BuiltIns::new();
    for (_, def) in table.builtins() {
        builtins.register(def.name.clone(), |_, args| match args.len() {
            0 | 1 => Ok(Object::TRUE),
            _ => Err(BuiltInError::new("unexpected arguments")),
        });
    }
    builtins.register("has_every", |_, _| Ok(Object::FALSE));
    builtins.register("has_anyof", |_, _| Ok(Object::TRUE));
    let vm = VM::new(table, builtins)
        .unwrap()
        .with_quantity_check(|_, _, qty| Ok(Object::bool(qty <= 1)));

    assert_eq!(vm.execute(&code).unwrap(), Object::TRUE);
    bench.iter(|| black_box(vm.execute(black_box(&code)).unwrap()));
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("compile_rule", compile_rule);
    c.bench_function("execute_rule", execute_rule);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
