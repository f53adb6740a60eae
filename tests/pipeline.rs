use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use weft::{
    compile_opcodes, CompileState, Document, DomBackend, Registry, Scanner, SerializedTemplate,
    WeftError,
};

fn program(body: Value) -> String {
    let mut stream = vec![json!(["startProgram", {"blockParams": []}])];
    stream.extend(body.as_array().cloned().unwrap_or_default());
    stream.push(json!(["endProgram"]));
    Value::Array(stream).to_string()
}

fn render_with(env: &Registry, spec: &SerializedTemplate, data: Value) -> String {
    let entry = Scanner::new(spec, env).scan_entry_point().unwrap();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    entry.render(env, &mut doc, root, data).unwrap();
    doc.inner_html(root)
}

fn render(body: Value, data: Value) -> String {
    let spec = compile_opcodes(&program(body)).unwrap();
    render_with(&Registry::new(), &spec, data)
}

#[test]
fn test_text_program() {
    let spec = compile_opcodes(&program(json!([["text", "hi"]]))).unwrap();
    assert_eq!(
        spec.to_json_string().unwrap(),
        r#"{"statements":[["text","hi"]],"locals":[],"named":[],"yields":[],"blocks":[],"meta":null}"#
    );
    assert_eq!(render_with(&Registry::new(), &spec, Value::Null), "hi");
}

#[test]
fn test_layout_renders_named_argument() {
    let spec = compile_opcodes(&program(json!([["attr", ["name"]], ["append", false]]))).unwrap();
    assert_eq!(spec.named, vec!["name".to_string()]);

    let env = Registry::new();
    let layout = Scanner::new(&spec, &env).scan_layout().unwrap();
    assert!(layout.has_named_parameters());
    assert!(!layout.has_yields());

    let mut doc = Document::new();
    let root = doc.create_fragment();
    let mut args = IndexMap::new();
    args.insert("name".to_string(), json!("Ann"));
    let mut result = layout.render(&env, &mut doc, root, args).unwrap();
    assert_eq!(doc.inner_html(root), "Ann");

    result.set_arg("name", json!("Bob")).unwrap();
    let stats = result.refresh(&env, &mut doc).unwrap();
    assert_eq!(doc.inner_html(root), "Bob");
    assert_eq!(stats.mutations, 1);
    assert!(result.set_arg("missing", json!(1)).is_err());
}

#[test]
fn test_prepare_array_is_lifo() {
    let mut env = Registry::new();
    env.register_helper("list", |positional, _| {
        Value::String(
            positional
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    });
    let spec = compile_opcodes(&program(json!([
        ["prepareObject", 0],
        ["literal", "a"],
        ["literal", "b"],
        ["prepareArray", 2],
        ["helper", ["list"]],
        ["append", false]
    ])))
    .unwrap();
    assert_eq!(render_with(&env, &spec, Value::Null), "b,a");
}

#[test]
fn test_compilation_is_deterministic() {
    let source = program(json!([
        ["startProgram", {"blockParams": ["item"]}],
        ["get", ["item"]],
        ["append", false],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["items"]],
        ["prepareArray", 1],
        ["block", ["each"], 0, null],
        ["openElement", "p", null],
        ["attr", ["tone"]],
        ["dynamicAttr", "class", null],
        ["closeElement"]
    ]));
    let first = compile_opcodes(&source).unwrap().to_json_string().unwrap();
    let second = compile_opcodes(&source).unwrap().to_json_string().unwrap();
    assert_eq!(first, second);

    let reparsed = SerializedTemplate::from_json_str(&first).unwrap();
    assert_eq!(reparsed.to_json_string().unwrap(), first);
}

#[test]
fn test_compilation_is_memoized() {
    let spec = compile_opcodes(&program(json!([["text", "once"]]))).unwrap();
    let env = Registry::new();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();

    assert_eq!(entry.compile_state(), CompileState::Uncompiled);
    let first = entry.compile(&env).unwrap();
    assert_eq!(entry.compile_state(), CompileState::Compiled);
    let second = entry.compile(&env).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_if_else_switches_on_rerender() {
    let spec = compile_opcodes(&program(json!([
        ["startProgram", {"blockParams": []}],
        ["text", "yes"],
        ["endProgram"],
        ["startProgram", {"blockParams": []}],
        ["text", "no"],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["show"]],
        ["prepareArray", 1],
        ["block", ["if"], 0, 1]
    ])))
    .unwrap();
    let env = Registry::new();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    let mut result = entry.render(&env, &mut doc, root, json!({"show": true})).unwrap();
    assert_eq!(doc.inner_html(root), "yes");

    let unchanged = result.rerender(&env, &mut doc, json!({"show": 1})).unwrap();
    assert_eq!(unchanged.mutations, 0);
    assert_eq!(unchanged.instructions, 0);

    let stats = result.rerender(&env, &mut doc, json!({"show": false})).unwrap();
    assert_eq!(doc.inner_html(root), "no");
    assert!(stats.instructions > 0);
    assert_eq!(result.nodes(&doc).len(), 1);
}

#[test]
fn test_unless_without_inverse_leaves_placeholder() {
    let spec = compile_opcodes(&program(json!([
        ["startProgram", {"blockParams": []}],
        ["text", "hidden"],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["done"]],
        ["prepareArray", 1],
        ["block", ["unless"], 0, null]
    ])))
    .unwrap();
    let env = Registry::new();
    assert_eq!(render_with(&env, &spec, json!({"done": true})), "<!---->");
    assert_eq!(render_with(&env, &spec, json!({"done": false})), "hidden");
}

#[test]
fn test_with_binds_block_parameter() {
    let html = render(
        json!([
            ["startProgram", {"blockParams": ["user"]}],
            ["get", ["user", "name"]],
            ["append", false],
            ["endProgram"],
            ["prepareObject", 0],
            ["get", ["owner"]],
            ["prepareArray", 1],
            ["block", ["with"], 0, null]
        ]),
        json!({"owner": {"name": "Ann"}}),
    );
    assert_eq!(html, "Ann");
}

#[test]
fn test_each_with_index_and_else() {
    let body = json!([
        ["startProgram", {"blockParams": ["item", "i"]}],
        ["get", ["i"]],
        ["append", false],
        ["text", ":"],
        ["get", ["item"]],
        ["append", false],
        ["text", " "],
        ["endProgram"],
        ["startProgram", {"blockParams": []}],
        ["text", "empty"],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["items"]],
        ["prepareArray", 1],
        ["block", ["each"], 0, 1]
    ]);
    assert_eq!(render(body.clone(), json!({"items": ["x", "y"]})), "0:x 1:y ");
    assert_eq!(render(body, json!({"items": []})), "empty");
}

#[test]
fn test_element_attributes_and_properties() {
    let html = render(
        json!([
            ["openElement", "input", null],
            ["literal", "field"],
            ["staticAttr", "class", null],
            ["get", ["size"]],
            ["addClass"],
            ["get", ["disabled"]],
            ["dynamicAttr", "disabled", null],
            ["get", ["hint"]],
            ["dynamicAttr", "title", null],
            ["get", ["value"]],
            ["dynamicProp", "value"],
            ["closeElement"]
        ]),
        json!({"size": "lg", "disabled": true, "hint": null, "value": "v"}),
    );
    assert_eq!(html, r#"<input disabled="" class="field lg">"#);
}

#[test]
fn test_helpers_and_concat() {
    let mut env = Registry::new();
    env.register_helper("upper", |positional, _| {
        Value::String(
            positional
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase(),
        )
    });
    env.register_helper("greeting", |_, _| json!("hello"));
    let spec = compile_opcodes(&program(json!([
        ["unknown", ["greeting"]],
        ["append", false],
        ["text", " "],
        ["prepareObject", 0],
        ["get", ["last"]],
        ["literal", " "],
        ["get", ["first"]],
        ["prepareArray", 3],
        ["concat"],
        ["prepareArray", 1],
        ["helper", ["upper"]],
        ["append", false]
    ])))
    .unwrap();
    assert_eq!(
        render_with(&env, &spec, json!({"first": "ann", "last": "lee"})),
        "hello ANN LEE"
    );
}

#[test]
fn test_component_with_block_and_attributes() {
    let mut env = Registry::new();
    let layout_spec = compile_opcodes(&program(json!([
        ["openElement", "div", null],
        ["literal", "card"],
        ["staticAttr", "class", null],
        ["attr", ["title"]],
        ["append", false],
        ["text", " "],
        ["prepareArray", 0],
        ["yield", "default"],
        ["closeElement"]
    ])))
    .unwrap();
    let layout = Scanner::new(&layout_spec, &env).scan_layout().unwrap();
    assert!(layout.has_yields());
    env.register_component("x-card", layout);

    let spec = compile_opcodes(&program(json!([
        ["startProgram", {"blockParams": []}],
        ["get", ["body"]],
        ["append", false],
        ["endProgram"],
        ["get", ["heading"]],
        ["literal", "@title"],
        ["literal", "wide"],
        ["literal", "class"],
        ["prepareObject", 2],
        ["component", "x-card", 0]
    ])))
    .unwrap();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    let mut result = entry
        .render(&env, &mut doc, root, json!({"heading": "Hello", "body": "world"}))
        .unwrap();
    assert_eq!(doc.inner_html(root), r#"<div class="card wide">Hello world</div>"#);

    let stats = result
        .rerender(&env, &mut doc, json!({"heading": "Hi", "body": "world"}))
        .unwrap();
    assert_eq!(doc.inner_html(root), r#"<div class="card wide">Hi world</div>"#);
    assert_eq!(stats.mutations, 1);
}

#[test]
fn test_layout_with_two_roots_is_malformed() {
    let spec = compile_opcodes(&program(json!([
        ["openElement", "p", null],
        ["closeElement"],
        ["openElement", "p", null],
        ["closeElement"]
    ])))
    .unwrap();
    let env = Registry::new();
    let layout = Scanner::new(&spec, &env).scan_layout().unwrap();
    let err = layout.compile(&env).unwrap_err();
    assert!(matches!(err, WeftError::MalformedTemplate { .. }));
}

#[test]
fn test_unknown_block_helper_is_unresolved() {
    let spec = compile_opcodes(&program(json!([
        ["startProgram", {"blockParams": []}],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["x"]],
        ["prepareArray", 1],
        ["block", ["repeat"], 0, null]
    ])))
    .unwrap();
    let env = Registry::new();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
    let err = entry.compile(&env).unwrap_err();
    assert!(matches!(err, WeftError::UnresolvedCapability { .. }));
}

#[test]
fn test_undeclared_named_argument_is_unresolved_symbol() {
    let spec = SerializedTemplate::from_json_str(
        &json!({
            "statements": [["append", ["attr", ["ghost"]], false]],
            "blocks": []
        })
        .to_string(),
    )
    .unwrap();
    let env = Registry::new();
    let layout = Scanner::new(&spec, &env).scan_layout().unwrap();
    let err = layout.compile(&env).unwrap_err();
    assert!(matches!(err, WeftError::UnresolvedSymbol { .. }));
}

#[test]
fn test_modifier_reinstalls_when_arguments_change() {
    let mut env = Registry::new();
    env.register_modifier("mark", |dom, element, positional, _| {
        let label = positional.first().and_then(Value::as_str).unwrap_or_default();
        dom.set_attribute(element, "data-mark", label, None);
    });
    let spec = compile_opcodes(&program(json!([
        ["openElement", "span", null],
        ["prepareObject", 0],
        ["get", ["label"]],
        ["prepareArray", 1],
        ["modifier", ["mark"]],
        ["closeElement"]
    ])))
    .unwrap();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    let mut result = entry.render(&env, &mut doc, root, json!({"label": "a"})).unwrap();
    assert_eq!(doc.inner_html(root), r#"<span data-mark="a"></span>"#);

    result.rerender(&env, &mut doc, json!({"label": "b"})).unwrap();
    assert_eq!(doc.inner_html(root), r#"<span data-mark="b"></span>"#);
}
