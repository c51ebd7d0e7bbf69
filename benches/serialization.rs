use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_graph::{
    BinarySerializer, Format, JsonSerializer, MemberType, Model, ModelRef, Serializer, SharedList,
    TypeRegistry, Value, XmlSerializer,
};
use std::sync::Arc;

#[derive(Default)]
struct Product {
    sku: String,
    price: f64,
    quantity: i64,
}

impl Model for Product {}

#[derive(Default)]
struct Catalog {
    products: Option<SharedList>,
    featured: Option<SharedList>,
}

impl Model for Catalog {}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Product>("Product")
        .field(
            "Sku",
            MemberType::String,
            |p| Value::from(p.sku.as_str()),
            |p, v| {
                p.sku = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Price",
            MemberType::Float,
            |p| Value::from(p.price),
            |p, v| {
                p.price = v.try_into()?;
                Ok(())
            },
        )
        .field(
            "Quantity",
            MemberType::Integer,
            |p| Value::from(p.quantity),
            |p, v| {
                p.quantity = v.try_into()?;
                Ok(())
            },
        )
        .finish()
        .unwrap();
    registry
        .register::<Catalog>("Catalog")
        .field(
            "Products",
            MemberType::list(MemberType::model("Product")),
            |c| c.products.clone().into(),
            |c, v| {
                c.products = v.into_list()?;
                Ok(())
            },
        )
        .field(
            "Featured",
            MemberType::list(MemberType::model("Product")),
            |c| c.featured.clone().into(),
            |c, v| {
                c.featured = v.into_list()?;
                Ok(())
            },
        )
        .finish()
        .unwrap();
    Arc::new(registry)
}

/// A catalog of `size` products where every tenth one is also featured.
fn catalog(size: i64) -> ModelRef {
    let products: Vec<Value> = (0..size)
        .map(|i| {
            Value::model(Product {
                sku: format!("SKU{}", i),
                price: 9.99 + i as f64,
                quantity: i,
            })
        })
        .collect();
    let featured: Vec<Value> = products.iter().step_by(10).cloned().collect();
    ModelRef::new(Catalog {
        products: Value::list(products).as_list().cloned(),
        featured: Value::list(featured).as_list().cloned(),
    })
}

fn bench_format<F: Format>(c: &mut Criterion, serializer: &Serializer<F>) {
    let mut group = c.benchmark_group(format!("{}_serialize", F::NAME));
    for size in [10, 100, 500].iter() {
        let model = catalog(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &model, |b, model| {
            b.iter(|| serializer.serialize_to_vec(black_box(model)))
        });
    }
    group.finish();

    let mut group = c.benchmark_group(format!("{}_deserialize", F::NAME));
    for size in [10, 100, 500].iter() {
        let bytes = serializer.serialize_to_vec(&catalog(*size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| serializer.deserialize_from_slice(black_box(bytes)))
        });
    }
    group.finish();
}

fn benchmark_xml(c: &mut Criterion) {
    bench_format(c, &XmlSerializer::new(registry()));
}

fn benchmark_json(c: &mut Criterion) {
    bench_format(c, &JsonSerializer::new(registry()));
}

fn benchmark_binary(c: &mut Criterion) {
    bench_format(c, &BinarySerializer::new(registry()));
}

fn benchmark_document_only(c: &mut Criterion) {
    let serializer = JsonSerializer::new(registry());
    let model = catalog(100);

    c.bench_function("serialize_to_node", |b| {
        b.iter(|| serializer.serialize_to_node(black_box(&model)))
    });

    let node = serializer.serialize_to_node(&model).unwrap();
    c.bench_function("deserialize_node", |b| {
        b.iter(|| serializer.deserialize_node(black_box(node.clone())))
    });
}

criterion_group!(
    benches,
    benchmark_xml,
    benchmark_json,
    benchmark_binary,
    benchmark_document_only
);
criterion_main!(benches);
