//! End-to-end properties across the access modes: encode/decode round
//! trips, mode equivalence, index soundness and the streaming-mode
//! restrictions.

use std::io::Write;
use tokio::io::AsyncReadExt;

use cairn_car::{read_raw, CarDatastore, Error, Indexer, RawCid};

fn raw_cid(digest: &[u8]) -> RawCid {
    // CIDv1, raw codec, identity multihash
    let mut bytes = vec![0x01, 0x55, 0x00, digest.len() as u8];
    bytes.extend_from_slice(digest);
    RawCid::new(bytes)
}

async fn build_archive(roots: &[RawCid], blocks: &[(RawCid, Vec<u8>)]) -> Vec<u8> {
    let (tx, mut rx) = tokio::io::duplex(1 << 20);
    let mut store = CarDatastore::write_stream(tx);
    store.set_roots(roots).await.unwrap();
    for (cid, payload) in blocks {
        store.put(cid, payload).await.unwrap();
    }
    store.close().await.unwrap();

    let mut bytes = Vec::new();
    rx.read_to_end(&mut bytes).await.unwrap();
    bytes
}

async fn collect_query(store: &mut CarDatastore) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    let mut query = store.query(None).unwrap();
    while let Some(pair) = query.next().await.unwrap() {
        out.push(pair);
    }
    out
}

fn temp_archive(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp
}

#[tokio::test]
async fn round_trip_preserves_roots_and_block_order() {
    let cids: Vec<RawCid> = (0u8..5).map(|i| raw_cid(&[i; 8])).collect();
    let blocks: Vec<(RawCid, Vec<u8>)> = cids
        .iter()
        .enumerate()
        .map(|(i, cid)| (cid.clone(), vec![i as u8; 3 + i]))
        .collect();

    for roots in [
        Vec::new(),
        vec![cids[0].clone()],
        vec![cids[0].clone(), cids[3].clone(), cids[4].clone()],
    ] {
        let bytes = build_archive(&roots, &blocks).await;
        let mut store = CarDatastore::read_buffer(bytes).await.unwrap();
        assert_eq!(store.get_roots().unwrap(), roots);

        let yielded = collect_query(&mut store).await;
        assert_eq!(yielded.len(), blocks.len());
        for ((key, payload), (cid, expected)) in yielded.iter().zip(&blocks) {
            assert_eq!(key, &cid.to_base58());
            assert_eq!(payload, expected);
        }
        store.close().await.unwrap();
    }
}

#[tokio::test]
async fn empty_archive_is_just_the_header() {
    let bytes = build_archive(&[], &[]).await;
    // varint(17) plus the canonical CBOR {roots: [], version: 1}
    assert_eq!(bytes.len(), 18);

    let mut store = CarDatastore::read_buffer(bytes).await.unwrap();
    assert!(store.get_roots().unwrap().is_empty());
    assert!(collect_query(&mut store).await.is_empty());
}

#[tokio::test]
async fn single_root_three_blocks() {
    let (a, b, c) = (raw_cid(b"aaaa"), raw_cid(b"bbbb"), raw_cid(b"cccc"));
    let blocks = vec![
        (a.clone(), b"a-data".to_vec()),
        (b.clone(), b"b-data".to_vec()),
        (c.clone(), b"c-data".to_vec()),
    ];
    let bytes = build_archive(std::slice::from_ref(&a), &blocks).await;

    let mut store = CarDatastore::read_buffer(bytes).await.unwrap();
    assert_eq!(store.get_roots().unwrap(), vec![a.clone()]);
    assert_eq!(store.get(&b).await.unwrap(), b"b-data");
    assert!(!store.has(&raw_cid(b"xxxx")).await.unwrap());

    let yielded = collect_query(&mut store).await;
    let keys: Vec<&str> = yielded.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec![a.to_base58(), b.to_base58(), c.to_base58()]);
}

#[tokio::test]
async fn all_read_modes_agree() {
    let cids: Vec<RawCid> = (0u8..7).map(|i| raw_cid(&[i + 1; 6])).collect();
    let blocks: Vec<(RawCid, Vec<u8>)> = cids
        .iter()
        .enumerate()
        .map(|(i, cid)| (cid.clone(), format!("payload-{i}").into_bytes()))
        .collect();
    let roots = vec![cids[0].clone(), cids[1].clone()];
    let bytes = build_archive(&roots, &blocks).await;
    let tmp = temp_archive(&bytes);

    let mut buffer = CarDatastore::read_buffer(bytes.clone()).await.unwrap();
    let mut stream_complete =
        CarDatastore::read_stream_complete(std::io::Cursor::new(bytes.clone()))
            .await
            .unwrap();
    let mut file = CarDatastore::read_file_complete(tmp.path()).await.unwrap();
    let mut streaming = CarDatastore::read_streaming(std::io::Cursor::new(bytes.clone()))
        .await
        .unwrap();

    let reference = collect_query(&mut buffer).await;
    assert_eq!(reference.len(), blocks.len());

    for store in [&mut stream_complete, &mut file, &mut streaming] {
        assert_eq!(store.get_roots().unwrap(), roots);
        assert_eq!(collect_query(store).await, reference);
    }

    // The full-surface modes also agree on point lookups
    for store in [&mut buffer, &mut stream_complete, &mut file] {
        for (cid, payload) in &blocks {
            assert!(store.has(cid).await.unwrap());
            assert_eq!(&store.get(cid).await.unwrap(), payload);
        }
    }
}

#[tokio::test]
async fn duplicate_cids_shadow_for_get_but_not_query() {
    let (a, b) = (raw_cid(b"aaaa"), raw_cid(b"bbbb"));
    let blocks = vec![
        (a.clone(), b"p1".to_vec()),
        (b.clone(), b"other".to_vec()),
        (a.clone(), b"p2".to_vec()),
    ];
    let bytes = build_archive(&[], &blocks).await;
    let tmp = temp_archive(&bytes);

    let mut buffer = CarDatastore::read_buffer(bytes.clone()).await.unwrap();
    let mut file = CarDatastore::read_file_complete(tmp.path()).await.unwrap();

    for store in [&mut buffer, &mut file] {
        assert_eq!(store.get(&a).await.unwrap(), b"p2");
        let yielded = collect_query(store).await;
        assert_eq!(yielded.len(), 3);
        assert_eq!(yielded[0].1, b"p1");
        assert_eq!(yielded[2].1, b"p2");
    }
}

#[tokio::test]
async fn index_entries_locate_exactly_the_payloads() {
    let cids: Vec<RawCid> = (0u8..4).map(|i| raw_cid(&[i + 10; 5])).collect();
    let blocks: Vec<(RawCid, Vec<u8>)> = cids
        .iter()
        .enumerate()
        .map(|(i, cid)| (cid.clone(), vec![0xF0 + i as u8; 9]))
        .collect();
    let bytes = build_archive(&[], &blocks).await;
    let tmp = temp_archive(&bytes);

    let mut indexer = Indexer::open(tmp.path()).await.unwrap();
    let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();
    let mut count = 0;
    while let Some(entry) = indexer.next().await.unwrap() {
        let (cid, expected) = &blocks[count];
        assert_eq!(&entry.cid, cid);
        assert_eq!(entry.key, cid.to_base58());
        assert_eq!(entry.block_length as usize, expected.len());

        // The entry's byte range reproduces the payload both through
        // read_raw and through the raw file bytes
        let payload = read_raw(&mut file, &entry).await.unwrap();
        assert_eq!(&payload, expected);
        let start = entry.block_offset as usize;
        assert_eq!(&bytes[start..start + payload.len()], expected.as_slice());
        count += 1;
    }
    assert_eq!(count, blocks.len());
}

#[tokio::test]
async fn streaming_query_is_single_pass() {
    let blocks: Vec<(RawCid, Vec<u8>)> = (0u16..100)
        .map(|i| {
            let digest = i.to_be_bytes();
            (raw_cid(&digest), vec![i as u8; 4])
        })
        .collect();
    let bytes = build_archive(&[], &blocks).await;

    // Drain to completion, then point lookups are still unsupported
    let mut store = CarDatastore::read_streaming(std::io::Cursor::new(bytes.clone()))
        .await
        .unwrap();
    let yielded = collect_query(&mut store).await;
    assert_eq!(yielded.len(), 100);
    assert!(matches!(
        store.get(&blocks[0].0).await,
        Err(Error::UnsupportedOperation("get"))
    ));

    // A second query before the first is drained is refused
    let mut store = CarDatastore::read_streaming(std::io::Cursor::new(bytes))
        .await
        .unwrap();
    {
        let mut query = store.query(None).unwrap();
        query.next().await.unwrap().unwrap();
    }
    assert!(matches!(
        store.query(None),
        Err(Error::ConcurrentIteration)
    ));
}

#[tokio::test]
async fn truncated_archive_fails_with_unexpected_end() {
    let a = raw_cid(b"aaaa");
    let blocks = vec![(a.clone(), b"some longer payload".to_vec())];
    let mut bytes = build_archive(std::slice::from_ref(&a), &blocks).await;
    bytes.truncate(bytes.len() - 10);

    let result = CarDatastore::read_buffer(bytes).await;
    assert!(matches!(result, Err(Error::UnexpectedEnd)));
}

#[tokio::test]
async fn zeroed_cid_version_byte_fails_decode() {
    let a = raw_cid(b"aaaa");
    let blocks = vec![(a.clone(), b"payload".to_vec())];
    let mut bytes = build_archive(std::slice::from_ref(&a), &blocks).await;

    // First block frame sits right after the header: varint(len) then the
    // CID, whose first byte is the version
    let header_len = 1 + bytes[0] as usize;
    let version_byte = header_len + 1;
    assert_eq!(bytes[version_byte], 0x01);
    bytes[version_byte] = 0x00;

    let result = CarDatastore::read_buffer(bytes).await;
    assert!(matches!(result, Err(Error::UnsupportedCidVersion(0))));
}
