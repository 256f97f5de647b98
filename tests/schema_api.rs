use dynsoa::prelude::*;
use dynsoa::{RuntimeError, SchemaError};

#[test]
fn archetype_ids_are_one_based_and_stable() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new("A", vec![Field::new("a", ScalarType::F32)]));
    rt.define_component(Component::new("B", vec![Field::new("b", ScalarType::F32)]));

    let first = rt.define_archetype("First", &["A"]);
    let second = rt.define_archetype("Second", &["A", "B"]);
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    assert_eq!(rt.schema().archetype(first).unwrap().components, vec!["A"]);
    assert!(rt.schema().archetype(0).is_none());
    assert!(rt.schema().archetype(99).is_none());
}

#[test]
fn component_redefinition_is_last_wins() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new("Position", vec![Field::new("x", ScalarType::F32)]));
    let arch = rt.define_archetype("P", &["Position"]);

    let v1 = rt.spawn(arch, 8).unwrap();
    assert!(rt.column_slice::<f32>(v1, "Position.x").is_some());
    assert!(rt.column_slice::<f32>(v1, "Position.y").is_none());

    rt.define_component(Component::new(
        "Position",
        vec![Field::new("x", ScalarType::F32), Field::new("y", ScalarType::F32)],
    ));
    let v2 = rt.spawn(arch, 8).unwrap();
    assert!(rt.column_slice::<f32>(v2, "Position.y").is_some());

    // The earlier view captured the earlier definition.
    assert!(rt.column_slice::<f32>(v1, "Position.y").is_none());
}

#[test]
fn spawn_rejects_unknown_schema() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new("A", vec![Field::new("a", ScalarType::F32)]));

    assert!(matches!(
        rt.spawn(42, 8),
        Err(RuntimeError::Schema(SchemaError::UnknownArchetype { archetype: 42 }))
    ));

    let arch = rt.define_archetype("Broken", &["A", "Missing"]);
    match rt.spawn(arch, 8) {
        Err(RuntimeError::Schema(SchemaError::UnknownComponent { component })) => {
            assert_eq!(component, "Missing");
        }
        other => panic!("expected UnknownComponent, got {other:?}"),
    }
}

#[test]
fn spawn_honors_field_scalar_widths() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new(
        "Mixed",
        vec![
            Field::new("a", ScalarType::F32),
            Field::new("b", ScalarType::I64),
            Field::new("c", ScalarType::U32),
            Field::new("d", ScalarType::F64),
            Field::new("e", ScalarType::I32),
        ],
    ));
    let arch = rt.define_archetype("M", &["Mixed"]);
    let v = rt.spawn(arch, 100).unwrap();

    assert_eq!(rt.store().column_bytes(v, "Mixed.a").unwrap().len(), 400);
    assert_eq!(rt.store().column_bytes(v, "Mixed.b").unwrap().len(), 800);
    assert_eq!(rt.store().column_bytes(v, "Mixed.c").unwrap().len(), 400);
    assert_eq!(rt.store().column_bytes(v, "Mixed.d").unwrap().len(), 800);
    assert_eq!(rt.store().column_bytes(v, "Mixed.e").unwrap().len(), 400);

    // Typed access checks the scalar tag, not just the width.
    assert!(rt.column_slice::<i64>(v, "Mixed.b").is_some());
    assert!(rt.column_slice::<f64>(v, "Mixed.b").is_none());
    assert!(rt.column_slice::<f32>(v, "Mixed.c").is_none());
    assert!(rt.column_slice::<u32>(v, "Mixed.c").is_some());

    // bytes_to_move sums every column: 100 * (4 + 8 + 4 + 8 + 4).
    assert_eq!(rt.store().bytes_to_move(v), 2800);
}

#[test]
fn make_view_finds_first_existing_view_or_creates_empty() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new("A", vec![Field::new("a", ScalarType::F32)]));
    let arch = rt.define_archetype("P", &["A"]);

    let spawned = rt.spawn(arch, 16).unwrap();
    assert_eq!(rt.make_view(arch), spawned);

    let other_arch = rt.define_archetype("Q", &["A"]);
    let empty = rt.make_view(other_arch);
    assert_ne!(empty, spawned);
    assert_eq!(rt.view_len(empty), 0);
    assert_eq!(rt.current_layout(empty), Some(LayoutKind::SoA));

    // A second make_view for the same archetype returns the same view.
    assert_eq!(rt.make_view(other_arch), empty);
}
