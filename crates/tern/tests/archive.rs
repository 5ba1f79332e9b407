//! Library-archive (v1) build/inspect round trips over in-memory buffers.

use pretty_assertions::assert_eq;
use tern::{
    build_archive, inspect_archive, ArchiveBuildOptions, ArchiveError, ChunkKind, ChunkPayload,
    Lane, Manifest,
};

fn sample_options() -> ArchiveBuildOptions {
    let manifest = Manifest {
        name: "core".to_owned(),
        version: "0.1.0".to_owned(),
        target_triple: "x86_64-unknown-linux-gnu".to_owned(),
        feature_bits: 0b101,
    };
    let manifest_bytes = serde_json::to_vec(&manifest).expect("manifest encodes");

    ArchiveBuildOptions {
        target_triple: "x86_64-unknown-linux-gnu".to_owned(),
        feature_bits: 0b101,
        flags: 0,
        chunks: vec![
            ChunkPayload::new(ChunkKind::Manifest, Lane::Global, manifest_bytes),
            ChunkPayload::new(ChunkKind::SymbolIndex, Lane::Pcore, b"sym-index".to_vec()),
            ChunkPayload::new(ChunkKind::OirArchive, Lane::Pcore, vec![1, 2, 3, 4, 5]),
        ],
    }
}

#[test]
fn build_then_inspect_round_trips_metadata() {
    let built = build_archive(&sample_options());
    let inspected = inspect_archive(&built.bytes).expect("inspect");

    assert_eq!(inspected.header, built.header);
    assert_eq!(inspected.records, built.records);
    assert_eq!(inspected.header.toc_entry_count, 3);
    assert_eq!(inspected.header.file_size, built.bytes.len() as u64);
}

#[test]
fn chunk_offsets_respect_alignment() {
    let built = build_archive(&sample_options());
    for r in &built.records {
        assert_eq!(r.offset % u64::from(r.alignment), 0);
    }
}

#[test]
fn identical_chunks_are_deduplicated() {
    let mut opt = sample_options();
    opt.chunks.push(ChunkPayload::new(
        ChunkKind::ObjectArchive,
        Lane::Pstd,
        vec![1, 2, 3, 4, 5],
    ));
    let built = build_archive(&opt);

    let oir = &built.records[2];
    let dup = &built.records[3];
    assert_eq!(oir.content_hash, dup.content_hash);
    assert!(!oir.deduplicated);
    assert!(dup.deduplicated);
    assert_eq!(oir.offset, dup.offset, "dedup shares the first copy's data");
}

#[test]
fn manifest_chunk_decodes_back() {
    let built = build_archive(&sample_options());
    let inspected = inspect_archive(&built.bytes).expect("inspect");
    let manifest_rec = inspected
        .records
        .iter()
        .find(|r| r.kind == ChunkKind::Manifest)
        .expect("manifest record");
    let lo = usize::try_from(manifest_rec.offset).unwrap();
    let hi = lo + usize::try_from(manifest_rec.size).unwrap();
    let manifest: Manifest = serde_json::from_slice(&built.bytes[lo..hi]).expect("decodes");
    assert_eq!(manifest.name, "core");
    assert_eq!(manifest.feature_bits, 0b101);
}

#[test]
fn corruption_is_detected_by_checksum() {
    let built = build_archive(&sample_options());
    let mut bytes = built.bytes.clone();
    // flip one byte inside the last chunk's data
    let last = built.records.last().unwrap();
    let at = usize::try_from(last.offset).unwrap();
    bytes[at] ^= 0xFF;

    match inspect_archive(&bytes) {
        Err(ArchiveError::ChecksumMismatch { .. }) => {}
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn truncated_buffers_are_rejected() {
    let built = build_archive(&sample_options());
    let cut = &built.bytes[..built.bytes.len() - 3];
    assert!(inspect_archive(cut).is_err());
}

#[test]
fn wrong_major_version_is_rejected() {
    let built = build_archive(&sample_options());
    let mut bytes = built.bytes.clone();
    bytes[0] = 9; // format_major low byte
    match inspect_archive(&bytes) {
        Err(ArchiveError::BadVersion { major: 9, .. }) => {}
        other => panic!("expected version error, got {other:?}"),
    }
}
