//! Rendering compiled templates against resident data.

use std::time::Duration;

use layout_compiler::{
    CompileOptions, CompiledTemplate, ComponentRegistry, DiagnosticCode, RenderMode, Renderer,
    ResidentData, compile,
};

fn compiled(source: &str) -> CompiledTemplate {
    let result = compile(
        source,
        &ComponentRegistry::standard(),
        &CompileOptions::new().without_time_budget(),
    );
    assert!(result.success, "{:?}", result.errors);
    result.compiled.unwrap()
}

fn resident_data() -> ResidentData {
    serde_json::from_str(
        r#"{
            "owner": {"id": "u1", "handle": "ada", "displayName": "Ada"},
            "viewer": {"id": "u2"},
            "capabilities": {"bio": "Writes compilers for fun"}
        }"#,
    )
    .unwrap()
}

#[test]
fn full_document() {
    let registry = ComponentRegistry::standard();
    let template =
        compiled(r#"<div id="card"><OnClick><p>hi</p></OnClick><p>{owner.handle}</p></div>"#);
    let page = Renderer::new(&registry, RenderMode::Production)
        .render_document(&template, &resident_data());
    assert!(page.success);
    insta::assert_snapshot!(
        page.content.replace(&template.template_hash, "HASH"),
        @r#"<div id="card"><div data-island="island-HASH-0" data-island-component="OnClick"><div class="event" data-behavior="on-click"><p>hi</p></div></div><p>ada</p></div>"#
    );
}

#[test]
fn island_replay_is_a_fragment_of_the_document() {
    let registry = ComponentRegistry::standard();
    let renderer = Renderer::new(&registry, RenderMode::Production);
    let template = compiled(
        r#"<CenteredBox><DisplayName/><OnHover><Bio/></OnHover><Show when="viewer.id"><OnClick><p>{viewer.id}</p></OnClick></Show></CenteredBox>"#,
    );
    let data = resident_data();
    let document = renderer.render_document(&template, &data);
    assert!(document.success, "{:?}", document.errors);
    assert_eq!(template.islands.len(), 2);
    for island in &template.islands {
        let fragment = renderer.render_island(&template, &island.id, &data);
        assert!(fragment.success);
        assert!(document.content.contains(&fragment.content));
    }
    assert!(document.content.contains("Writes compilers for fun"));
    assert!(document.content.contains("<p>u2</p>"));
}

#[test]
fn hidden_when_viewer_is_anonymous() {
    let registry = ComponentRegistry::standard();
    let template = compiled(r#"<Show when="viewer.id"><p>signed in</p></Show><p>always</p>"#);
    let page = Renderer::new(&registry, RenderMode::Production)
        .render_document(&template, &ResidentData::default());
    insta::assert_snapshot!(page.content, @"<p>always</p>");
}

#[test]
fn preview_mode_reports_unresolved_bindings() {
    let registry = ComponentRegistry::standard();
    let template = compiled("<p>{capabilities.music}</p>");
    let production = Renderer::new(&registry, RenderMode::Production)
        .render_document(&template, &resident_data());
    let preview = Renderer::new(&registry, RenderMode::Preview)
        .render_document(&template, &resident_data());
    assert_eq!(production.content, "<p></p>");
    assert!(production.warnings.is_empty());
    insta::assert_snapshot!(
        preview.content,
        @r#"<p><span class="binding-unresolved">{capabilities.music}</span></p>"#
    );
    assert_eq!(preview.warnings[0].code, DiagnosticCode::RenderBindingUnresolved);
}

#[test]
fn stored_template_round_trip() {
    let registry = ComponentRegistry::standard();
    let template = compiled("<OnClick><p>{owner.displayName}</p></OnClick>");
    let restored = CompiledTemplate::from_json(&template.to_json().unwrap()).unwrap();
    let renderer = Renderer::new(&registry, RenderMode::Production);
    assert_eq!(
        renderer.render_document(&template, &resident_data()).content,
        renderer.render_document(&restored, &resident_data()).content
    );
}

#[test]
fn hydration_batch_renders_each_island() {
    let registry = ComponentRegistry::standard();
    let template = compiled("<OnClick><p>a</p></OnClick><p>static</p><OnHover><p>b</p></OnHover>");
    let batch = Renderer::new(&registry, RenderMode::Production).render_islands(
        &template,
        &resident_data(),
        Duration::from_secs(5),
    );
    let ids: Vec<_> = batch.islands.iter().map(|island| island.id.as_str()).collect();
    let expected: Vec<_> = template.islands.iter().map(|island| island.id.as_str()).collect();
    assert_eq!(ids, expected);
    assert!(batch.abandoned.is_empty());
}

#[test]
fn layout_props_render_their_checked_styles() {
    let registry = ComponentRegistry::standard();
    let template = compiled(r#"<GridLayout columns="3" gap="8" minColumnWidth="12rem"><p>x</p></GridLayout>"#);
    let page = Renderer::new(&registry, RenderMode::Production)
        .render_document(&template, &resident_data());
    insta::assert_snapshot!(
        page.content,
        @r#"<div class="layout-grid" style="display: grid; grid-template-columns: repeat(3, minmax(12rem, 1fr)); gap: 8px"><p>x</p></div>"#
    );
}

#[test]
fn styles_are_checked_again_after_bindings_resolve() {
    let registry = ComponentRegistry::standard();
    let stored = compiled(r#"<p style="color: red">x</p>"#)
        .to_json()
        .unwrap()
        .replace("color: red", "color: {owner.handle}");
    let template = CompiledTemplate::from_json(&stored).unwrap();
    let data: ResidentData = serde_json::from_str(
        r#"{"owner": {"id": "u1", "handle": "red; position: fixed; background: url(https://evil.example/t)"}}"#,
    )
    .unwrap();
    let page = Renderer::new(&registry, RenderMode::Production).render_document(&template, &data);
    assert!(page.success);
    insta::assert_snapshot!(page.content, @r#"<p style="color: red">x</p>"#);
    assert!(
        page.warnings
            .iter()
            .any(|warning| warning.code == DiagnosticCode::CssPropertyInvalid)
    );
}

#[test]
fn tampered_template_is_invalid_input() {
    let registry = ComponentRegistry::standard();
    let mut template = compiled("<OnClick><p>a</p></OnClick>");
    template.islands[0].end = template.islands[0].root;
    let page = Renderer::new(&registry, RenderMode::Production)
        .render_document(&template, &resident_data());
    assert!(!page.success);
    assert_eq!(page.errors[0].code, DiagnosticCode::InvalidRenderInput);
}
