//! Property-based tests for the guarantees every format must keep: member
//! values survive a round trip and so does the sharing structure of the graph.

use proptest::prelude::*;
use serde_graph::{
    BinarySerializer, JsonSerializer, MemberType, Model, ModelRef, SharedList, TypeRegistry, Value,
    XmlSerializer,
};
use std::sync::Arc;

#[derive(Default)]
struct Leaf {
    id: i64,
}

impl Model for Leaf {}

#[derive(Default)]
struct Sample {
    number: i64,
    ratio: f64,
    text: String,
    flag: bool,
    items: Option<SharedList>,
}

impl Model for Sample {}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Leaf>("Leaf")
        .field(
            "Id",
            MemberType::Integer,
            |l| Value::from(l.id),
            |l, v| {
                l.id = v.try_into()?;
                Ok(())
            },
        )
        .finish()
        .unwrap();
    registry
        .register::<Sample>("Sample")
        .field(
            "Number",
            MemberType::Integer,
            |s| Value::from(s.number),
            |s, v| {
                s.number = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Ratio",
            MemberType::Float,
            |s| Value::from(s.ratio),
            |s, v| {
                s.ratio = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Text",
            MemberType::String,
            |s| Value::from(s.text.as_str()),
            |s, v| {
                s.text = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Flag",
            MemberType::Bool,
            |s| Value::from(s.flag),
            |s, v| {
                s.flag = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Items",
            MemberType::list(MemberType::model("Leaf")),
            |s| s.items.clone().into(),
            |s, v| {
                s.items = v.into_list()?;
                Ok(())
            },
        )
        .finish()
        .unwrap();
    Arc::new(registry)
}

/// Serializes and reads back `model` once per format.
fn roundtrip(model: &ModelRef) -> Vec<(&'static str, ModelRef)> {
    let registry = registry();
    let xml = XmlSerializer::new(registry.clone());
    let json = JsonSerializer::new(registry.clone());
    let binary = BinarySerializer::new(registry);

    vec![
        ("xml", xml.deserialize_from_slice(&xml.serialize_to_vec(model).unwrap()).unwrap()),
        ("json", json.deserialize_from_slice(&json.serialize_to_vec(model).unwrap()).unwrap()),
        (
            "binary",
            binary
                .deserialize_from_slice(&binary.serialize_to_vec(model).unwrap())
                .unwrap(),
        ),
    ]
}

fn finite_f64() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

/// Any string XML 1.0 can carry: most C0 controls and U+FFFE/U+FFFF are out.
fn xml_text() -> impl Strategy<Value = String> {
    r"[^\x00-\x08\x0B\x0C\x0E-\x1F\x{FFFE}\x{FFFF}]*"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_primitive_members(
        number in any::<i64>(),
        ratio in finite_f64(),
        text in xml_text(),
        flag in any::<bool>(),
    ) {
        let model = ModelRef::new(Sample {
            number,
            ratio,
            text: text.clone(),
            flag,
            items: None,
        });

        for (format, copy) in roundtrip(&model) {
            let copy = copy.downcast::<Sample>().unwrap();
            let copy = copy.borrow();
            prop_assert_eq!(copy.number, number, "{}", format);
            prop_assert_eq!(copy.ratio, ratio, "{}", format);
            prop_assert_eq!(&copy.text, &text, "{}", format);
            prop_assert_eq!(copy.flag, flag, "{}", format);
            prop_assert!(copy.items.is_none());
        }
    }

    #[test]
    fn prop_sharing_structure_survives(
        pool in 1usize..5,
        picks in prop::collection::vec(0usize..5, 0..12),
    ) {
        let leaves: Vec<Value> = (0..pool).map(|id| Value::model(Leaf { id: id as i64 })).collect();
        let picks: Vec<usize> = picks.into_iter().map(|pick| pick % pool).collect();
        let items = Value::list(picks.iter().map(|&pick| leaves[pick].clone()).collect());
        let model = ModelRef::new(Sample {
            items: items.as_list().cloned(),
            ..Sample::default()
        });

        for (format, copy) in roundtrip(&model) {
            let copy = copy.downcast::<Sample>().unwrap();
            let items = copy.borrow().items.clone().unwrap();
            let items = items.borrow();
            prop_assert_eq!(items.len(), picks.len(), "{}", format);

            for (i, a) in picks.iter().enumerate() {
                let left = items[i].as_model().unwrap();
                let id = left.downcast::<Leaf>().unwrap().borrow().id;
                prop_assert_eq!(id, *a as i64, "{}", format);
                for (j, b) in picks.iter().enumerate() {
                    let right = items[j].as_model().unwrap();
                    prop_assert_eq!(left.ptr_eq(right), a == b, "{}", format);
                }
            }
        }
    }
}
