use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use weft::{compile_opcodes, Document, EntryPoint, NodeRef, Registry, RenderResult, Scanner};

/// `<li>{{item.name}}</li>` for each item, keyed by `id`
fn keyed_list() -> EntryPoint {
    let source = json!([
        ["startProgram", {"blockParams": []}],
        ["startProgram", {"blockParams": ["item"]}],
        ["openElement", "li", null],
        ["get", ["item", "name"]],
        ["append", false],
        ["closeElement"],
        ["endProgram"],
        ["literal", "id"],
        ["literal", "key"],
        ["prepareObject", 1],
        ["get", ["items"]],
        ["prepareArray", 1],
        ["block", ["each"], 0, null],
        ["endProgram"]
    ]);
    let spec = compile_opcodes(&source.to_string()).unwrap();
    Scanner::new(&spec, &Registry::new()).scan_entry_point().unwrap()
}

fn items(ids: &[u64]) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "name": format!("n{}", id)}))
        .collect();
    json!({ "items": items })
}

fn html(ids: &[u64]) -> String {
    ids.iter().map(|id| format!("<li>n{}</li>", id)).collect()
}

struct Rendered {
    doc: Document,
    root: NodeRef,
    result: RenderResult,
}

fn render(entry: &EntryPoint, data: Value) -> Rendered {
    let env = Registry::new();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    let result = entry.render(&env, &mut doc, root, data).unwrap();
    Rendered { doc, root, result }
}

#[test]
fn test_changed_item_touches_one_node() {
    let entry = keyed_list();
    let mut out = render(&entry, items(&[1, 2, 3]));
    assert_eq!(out.doc.inner_html(out.root), html(&[1, 2, 3]));

    let data = json!({"items": [
        {"id": 1, "name": "n1"},
        {"id": 2, "name": "changed"},
        {"id": 3, "name": "n3"}
    ]});
    let stats = out.result.rerender(&Registry::new(), &mut out.doc, data).unwrap();
    assert_eq!(
        out.doc.inner_html(out.root),
        "<li>n1</li><li>changed</li><li>n3</li>"
    );
    assert_eq!(stats.mutations, 1);
    assert_eq!(stats.instructions, 0);
}

#[test]
fn test_identical_rerender_is_free() {
    let entry = keyed_list();
    let mut out = render(&entry, items(&[1, 2]));
    let stats = out
        .result
        .rerender(&Registry::new(), &mut out.doc, items(&[1, 2]))
        .unwrap();
    assert_eq!(stats.mutations, 0);
    assert_eq!(stats.instructions, 0);
}

#[test]
fn test_reorder_moves_without_rendering() {
    let entry = keyed_list();
    let mut out = render(&entry, items(&[1, 2, 3]));
    let stats = out
        .result
        .rerender(&Registry::new(), &mut out.doc, items(&[3, 2, 1]))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[3, 2, 1]));
    assert_eq!(stats.instructions, 0);
    assert_eq!(stats.mutations, 2);
}

#[test]
fn test_insert_and_remove() {
    let entry = keyed_list();
    let env = Registry::new();
    let mut out = render(&entry, items(&[1, 3]));

    let inserted = out.result.rerender(&env, &mut out.doc, items(&[1, 2, 3])).unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[1, 2, 3]));
    assert!(inserted.instructions > 0);

    let removed = out.result.rerender(&env, &mut out.doc, items(&[1, 3])).unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[1, 3]));
    assert_eq!(removed.mutations, 1);
    assert_eq!(removed.instructions, 0);
}

#[test]
fn test_empty_list_keeps_a_placeholder() {
    let entry = keyed_list();
    let env = Registry::new();
    let mut out = render(&entry, items(&[]));
    assert_eq!(out.doc.inner_html(out.root), "<!---->");

    out.result.rerender(&env, &mut out.doc, items(&[7])).unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[7]));

    out.result.rerender(&env, &mut out.doc, items(&[])).unwrap();
    assert_eq!(out.doc.inner_html(out.root), "<!---->");

    out.result.rerender(&env, &mut out.doc, items(&[8, 9])).unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[8, 9]));
}

#[test]
fn test_duplicate_keys_render_every_item() {
    let entry = keyed_list();
    let mut out = render(&entry, items(&[1, 1, 2]));
    assert_eq!(out.doc.inner_html(out.root), html(&[1, 1, 2]));

    out.result
        .rerender(&Registry::new(), &mut out.doc, items(&[1, 2, 1]))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&[1, 2, 1]));
}

/// `<li>{{item}}</li>` for each item, keyed by the item itself
fn identity_list() -> EntryPoint {
    let source = json!([
        ["startProgram", {"blockParams": []}],
        ["startProgram", {"blockParams": ["item"]}],
        ["openElement", "li", null],
        ["get", ["item"]],
        ["append", false],
        ["closeElement"],
        ["endProgram"],
        ["prepareObject", 0],
        ["get", ["items"]],
        ["prepareArray", 1],
        ["block", ["each"], 0, null],
        ["endProgram"]
    ]);
    let spec = compile_opcodes(&source.to_string()).unwrap();
    Scanner::new(&spec, &Registry::new()).scan_entry_point().unwrap()
}

#[test]
fn test_key_shaped_like_a_suffix_keeps_its_own_iteration() {
    let entry = identity_list();
    let env = Registry::new();
    let mut out = render(&entry, json!({"items": ["a", "a", "a#1"]}));
    assert_eq!(
        out.doc.inner_html(out.root),
        "<li>a</li><li>a</li><li>a#1</li>"
    );

    out.result
        .rerender(&env, &mut out.doc, json!({"items": ["a#1", "a"]}))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), "<li>a#1</li><li>a</li>");

    out.result
        .rerender(&env, &mut out.doc, json!({"items": []}))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), "<!---->");
}

fn move_last_to_front(len: u64) -> usize {
    let entry = keyed_list();
    let ids: Vec<u64> = (1..=len).collect();
    let mut out = render(&entry, items(&ids));

    let mut moved = ids.clone();
    moved.rotate_right(1);
    let stats = out
        .result
        .rerender(&Registry::new(), &mut out.doc, items(&moved))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&moved));
    assert_eq!(stats.instructions, 0);
    stats.mutations
}

#[test]
fn test_single_move_cost_does_not_grow_with_the_list() {
    assert_eq!(move_last_to_front(5), 1);
    assert_eq!(move_last_to_front(50), 1);
    assert_eq!(move_last_to_front(200), 1);
}

#[test]
fn test_single_move_to_the_middle() {
    let entry = keyed_list();
    let ids: Vec<u64> = (1..=40).collect();
    let mut out = render(&entry, items(&ids));

    let mut moved = ids.clone();
    let first = moved.remove(0);
    moved.insert(20, first);
    let stats = out
        .result
        .rerender(&Registry::new(), &mut out.doc, items(&moved))
        .unwrap();
    assert_eq!(out.doc.inner_html(out.root), html(&moved));
    assert_eq!(stats.mutations, 1);
}

#[test]
fn test_random_updates_match_fresh_render() {
    let entry = keyed_list();
    let env = Registry::new();
    let mut rng = fastrand::Rng::with_seed(7);
    let mut out = render(&entry, items(&[1, 2, 3, 4, 5]));

    for _ in 0..200 {
        let len = rng.usize(0..10);
        let mut pool: Vec<u64> = (1..=12).collect();
        rng.shuffle(&mut pool);
        pool.truncate(len);

        out.result.rerender(&env, &mut out.doc, items(&pool)).unwrap();
        let fresh = render(&entry, items(&pool));
        assert_eq!(
            out.doc.inner_html(out.root),
            fresh.doc.inner_html(fresh.root),
            "after rendering {:?}",
            pool
        );
    }
}

#[test]
fn test_list_beside_siblings_keeps_its_position() {
    let source = json!([
        ["startProgram", {"blockParams": []}],
        ["startProgram", {"blockParams": ["item"]}],
        ["get", ["item"]],
        ["append", false],
        ["endProgram"],
        ["text", "["],
        ["prepareObject", 0],
        ["get", ["items"]],
        ["prepareArray", 1],
        ["block", ["each"], 0, null],
        ["text", "]"],
        ["endProgram"]
    ]);
    let spec = compile_opcodes(&source.to_string()).unwrap();
    let env = Registry::new();
    let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
    let mut doc = Document::new();
    let root = doc.create_fragment();
    let mut result = entry
        .render(&env, &mut doc, root, json!({"items": ["a", "b"]}))
        .unwrap();
    assert_eq!(doc.inner_html(root), "[ab]");

    result.rerender(&env, &mut doc, json!({"items": []})).unwrap();
    assert_eq!(doc.inner_html(root), "[<!---->]");

    result
        .rerender(&env, &mut doc, json!({"items": ["c", "b", "a"]}))
        .unwrap();
    assert_eq!(doc.inner_html(root), "[cba]");
}
