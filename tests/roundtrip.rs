//! End-to-end round trips through the array API against an in-memory store.

use std::sync::Arc;

use serde_json::json;
use zarrlite::{
    ArrayMetadata, ArrayRegion, ChunkKeySeparator, DataType, FillValue, MemoryBackend,
    StorageBackend, ZarrArray, ZarrValue, ZarrVectorValue,
};

fn float32_metadata(
    shape: Vec<usize>,
    chunk_shape: Vec<usize>,
    fill: f32,
    codecs: Vec<serde_json::Value>,
) -> ArrayMetadata {
    ArrayMetadata::new(
        shape,
        DataType::Float32,
        chunk_shape,
        FillValue::Value(ZarrValue::Float32(fill)),
        codecs,
    )
}

fn bytes_little() -> serde_json::Value {
    json!({"name": "bytes", "configuration": {"endian": "little"}})
}

fn ramp(n: usize) -> ZarrVectorValue {
    ZarrVectorValue::VFloat32((0..n).map(|x| x as f32).collect())
}

/// A 2x3x5 float32 array where slabs 0, 2 and 4 along the last axis hold the
/// fill value and slabs 1 and 3 hold data.
fn two_slab_array(fill: f32) -> ZarrVectorValue {
    let mut values = vec![fill; 30];
    for row in 0..6 {
        values[row * 5 + 1] = row as f32;
        values[row * 5 + 3] = 100.0 + row as f32;
    }
    ZarrVectorValue::VFloat32(values)
}

#[tokio::test]
async fn round_trip_across_chunk_shapes() {
    for chunk_shape in [
        vec![1, 1, 1],
        vec![1, 1, 5],
        vec![1, 3, 5],
        vec![2, 3, 5],
        vec![2, 2, 2],
    ] {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(
            store,
            "a",
            float32_metadata(vec![2, 3, 5], chunk_shape.clone(), 0.0, vec![bytes_little()]),
        )
        .await
        .unwrap();
        array.write_all(ramp(30)).await.unwrap();
        assert_eq!(
            array.read_all().await.unwrap(),
            ramp(30),
            "chunk shape {chunk_shape:?}"
        );
    }
}

#[tokio::test]
async fn transpose_bytes_pipeline_round_trips_exactly() {
    // 2x3x5 float32, chunk shape [1,1,1], {transpose([2,0,1]), bytes(little)}.
    let store = Arc::new(MemoryBackend::new());
    let array = ZarrArray::create(
        store.clone(),
        "a",
        float32_metadata(
            vec![2, 3, 5],
            vec![1, 1, 1],
            0.0,
            vec![
                json!({"name": "transpose", "configuration": {"order": [2, 0, 1]}}),
                bytes_little(),
            ],
        ),
    )
    .await
    .unwrap();

    array.write_all(ramp(30)).await.unwrap();
    assert_eq!(array.read_all().await.unwrap(), ramp(30));

    // The same bytes decode after a fresh open.
    let reopened = ZarrArray::open(store, "a").await.unwrap();
    assert_eq!(reopened.read_all().await.unwrap(), ramp(30));
}

#[tokio::test]
async fn transpose_round_trips_for_every_order() {
    for order in [[0, 1, 2], [1, 0, 2], [0, 2, 1], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(
            store,
            "a",
            float32_metadata(
                vec![2, 3, 5],
                vec![1, 3, 5],
                0.0,
                vec![
                    json!({"name": "transpose", "configuration": {"order": order}}),
                    bytes_little(),
                ],
            ),
        )
        .await
        .unwrap();
        array.write_all(ramp(30)).await.unwrap();
        assert_eq!(array.read_all().await.unwrap(), ramp(30), "order {order:?}");
    }
}

#[tokio::test]
async fn compression_levels_decode_identically() {
    let mut payloads = Vec::new();
    for clevel in [1, 2, 4] {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(
            store,
            "a",
            float32_metadata(
                vec![10, 10, 10],
                vec![5, 5, 2],
                0.0,
                vec![
                    bytes_little(),
                    json!({"name": "blosc", "configuration": {
                        "cname": "lz4", "clevel": clevel, "shuffle": "shuffle",
                        "typesize": 4, "blocksize": 0,
                    }}),
                ],
            ),
        )
        .await
        .unwrap();
        array.write_all(ramp(1000)).await.unwrap();
        payloads.push(array.read_all().await.unwrap());
    }
    assert_eq!(payloads[0], ramp(1000));
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[1], payloads[2]);
}

#[tokio::test]
async fn separator_only_changes_key_strings() {
    let mut payloads = Vec::new();
    for separator in [
        ChunkKeySeparator::Slash,
        ChunkKeySeparator::Dot,
        ChunkKeySeparator::Dash,
    ] {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(
            store.clone(),
            "a",
            float32_metadata(vec![2, 3, 5], vec![1, 3, 5], 0.0, vec![bytes_little()])
                .with_separator(separator),
        )
        .await
        .unwrap();
        array.write_all(ramp(30)).await.unwrap();

        let mut keys = store.list_prefix("a/c").await.unwrap();
        keys.sort();
        let mut chunks = Vec::new();
        for key in keys {
            chunks.push(store.get(&key).await.unwrap().unwrap());
        }
        payloads.push(chunks);
    }
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[1], payloads[2]);
}

#[tokio::test]
async fn sharded_array_with_fill_slabs_round_trips() {
    // Shard shape [2,3,5], inner chunks [2,3,1]: 5 slabs, 3 of them pure
    // fill value, 2 written with data.
    for index_location in ["start", "end"] {
        let store = Arc::new(MemoryBackend::new());
        let data = two_slab_array(42.0);
        let array = ZarrArray::create(
            store.clone(),
            "a",
            float32_metadata(
                vec![2, 3, 5],
                vec![2, 3, 5],
                42.0,
                vec![json!({"name": "sharding_indexed", "configuration": {
                    "chunk_shape": [2, 3, 1],
                    "codecs": [bytes_little()],
                    "index_codecs": [bytes_little()],
                    "index_location": index_location,
                }})],
            ),
        )
        .await
        .unwrap();

        array.write_all(data.clone()).await.unwrap();
        assert_eq!(
            array.read_all().await.unwrap(),
            data,
            "index_location {index_location}"
        );

        // One shard object holds the whole array; two inner chunks of
        // 30 floats each plus an 80-byte index.
        let shard = store.get("a/c/0/0/0").await.unwrap().unwrap();
        assert_eq!(shard.len(), 5 * 16 + 2 * 2 * 3 * 4);
    }
}

#[tokio::test]
async fn sharded_array_with_compressed_inner_chunks() {
    let store = Arc::new(MemoryBackend::new());
    let data = two_slab_array(42.0);
    let array = ZarrArray::create(
        store,
        "a",
        float32_metadata(
            vec![2, 3, 5],
            vec![2, 3, 5],
            42.0,
            vec![json!({"name": "sharding_indexed", "configuration": {
                "chunk_shape": [1, 1, 1],
                "codecs": [
                    bytes_little(),
                    {"name": "blosc", "configuration": {
                        "cname": "lz4", "clevel": 4, "shuffle": "shuffle",
                        "typesize": 4, "blocksize": 0,
                    }},
                ],
                "index_codecs": [bytes_little()],
                "index_location": "end",
            }})],
        ),
    )
    .await
    .unwrap();

    array.write_all(data.clone()).await.unwrap();
    assert_eq!(array.read_all().await.unwrap(), data);
}

#[tokio::test]
async fn partial_region_reads_across_chunks() {
    let store = Arc::new(MemoryBackend::new());
    let array = ZarrArray::create(
        store,
        "a",
        float32_metadata(vec![10, 10], vec![3, 3], 0.0, vec![bytes_little()]),
    )
    .await
    .unwrap();
    array.write_all(ramp(100)).await.unwrap();

    let region = ArrayRegion::new(vec![2, 2], vec![5, 4]).unwrap();
    let out = array.read_region(&region).await.unwrap().to_f64_vec();
    let mut expected = Vec::new();
    for r in 2..7 {
        for c in 2..6 {
            expected.push((r * 10 + c) as f64);
        }
    }
    assert_eq!(out, expected);
}

#[tokio::test]
async fn incremental_writes_assemble_the_array() {
    let store = Arc::new(MemoryBackend::new());
    let array = ZarrArray::create(
        store,
        "a",
        float32_metadata(vec![4, 4], vec![2, 2], 42.0, vec![bytes_little()]),
    )
    .await
    .unwrap();

    // Write two disjoint regions, row by row.
    array
        .write_region(
            &ArrayRegion::new(vec![0, 0], vec![1, 4]).unwrap(),
            ZarrVectorValue::VFloat32(vec![1.0; 4]),
        )
        .await
        .unwrap();
    array
        .write_region(
            &ArrayRegion::new(vec![3, 0], vec![1, 4]).unwrap(),
            ZarrVectorValue::VFloat32(vec![2.0; 4]),
        )
        .await
        .unwrap();

    let out = array.read_all().await.unwrap().to_f64_vec();
    assert_eq!(&out[0..4], &[1.0; 4]);
    assert_eq!(&out[4..12], &[42.0; 8]);
    assert_eq!(&out[12..16], &[2.0; 4]);
}

#[tokio::test]
async fn int_arrays_round_trip_without_loss() {
    let store = Arc::new(MemoryBackend::new());
    let array = ZarrArray::create(
        store,
        "a",
        ArrayMetadata::new(
            vec![4],
            DataType::Int64,
            vec![2],
            FillValue::Value(ZarrValue::Int64(-1)),
            vec![json!({"name": "bytes", "configuration": {"endian": "big"}}), json!({"name": "zstd", "configuration": {"level": 3}})],
        ),
    )
    .await
    .unwrap();

    let data = ZarrVectorValue::VInt64(vec![i64::MIN, -1, 0, i64::MAX]);
    array.write_all(data.clone()).await.unwrap();
    assert_eq!(array.read_all().await.unwrap(), data);
}
