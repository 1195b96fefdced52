use layout_compiler::{
    CompileOptions, CompiledTemplate, ComponentRegistry, RenderMode, Renderer, ResidentData,
    compile,
};

fn options() -> CompileOptions {
    CompileOptions::new().without_time_budget()
}

fn compiled(registry: &ComponentRegistry, source: &str) -> CompiledTemplate {
    compile(source, registry, &options())
        .compiled
        .unwrap_or_else(|| panic!("benchmark fixture failed to compile"))
}

fn resident_data() -> ResidentData {
    serde_json::from_str(include_str!("fixtures/resident.json")).unwrap()
}

/// Full pipeline: pre-scan, parse, validate, detect islands, print.
fn bench_compile(bencher: divan::Bencher<'_, '_>, source: &str) {
    let registry = ComponentRegistry::standard();
    let options = options();
    bencher.bench_local(|| compile(source, &registry, &options));
}

/// Compile once upfront, then benchmark the production render.
fn bench_render(bencher: divan::Bencher<'_, '_>, source: &str) {
    let registry = ComponentRegistry::standard();
    let template = compiled(&registry, source);
    let data = resident_data();
    let renderer = Renderer::new(&registry, RenderMode::Production);
    bencher.bench_local(|| renderer.render_document(&template, &data));
}

#[divan::bench]
fn compile_minimal(bencher: divan::Bencher<'_, '_>) {
    bench_compile(bencher, include_str!("fixtures/minimal.html"));
}

#[divan::bench]
fn compile_blog(bencher: divan::Bencher<'_, '_>) {
    bench_compile(bencher, include_str!("fixtures/blog.html"));
}

#[divan::bench]
fn compile_interactive(bencher: divan::Bencher<'_, '_>) {
    bench_compile(bencher, include_str!("fixtures/interactive.html"));
}

#[divan::bench]
fn render_blog(bencher: divan::Bencher<'_, '_>) {
    bench_render(bencher, include_str!("fixtures/blog.html"));
}

#[divan::bench]
fn render_interactive(bencher: divan::Bencher<'_, '_>) {
    bench_render(bencher, include_str!("fixtures/interactive.html"));
}

fn main() {
    divan::main();
}
