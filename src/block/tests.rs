use rand::{rngs::StdRng, Rng, SeedableRng};
use rstest::rstest;

use super::*;
use crate::{
    filter::Filter,
    io::SliceReader,
    model::{Level, Model},
    sha1::Sha1,
    config,
    error::ProgramKind,
    vm::{ExecMode, Program},
};

fn stored() -> Model { Model::new(0, 0, Vec::new(), Program::default()).unwrap() }

fn archive(model: &Model, segments: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut compressor = Compressor::new(Vec::new());
    compressor.start_block(model).unwrap();
    for (name, data) in segments {
        compressor.start_segment(name, b"").unwrap();
        compressor.compress(data).unwrap();
        compressor.end_segment(Some(&Sha1::digest(data))).unwrap();
    }
    compressor.end_block().unwrap();
    compressor.into_inner()
}

type Extracted = Vec<(Vec<u8>, Vec<u8>, SegmentCheck)>;

fn extract(archive: &[u8], mode: ExecMode) -> crate::Result<Extracted> {
    let mut d = Decompresser::new(SliceReader::new(archive)).with_mode(mode);
    let mut segments = Vec::new();
    while d.find_block()? {
        while let Some(name) = d.find_filename()? {
            let mut out = Vec::new();
            d.decompress(&mut out)?;
            segments.push((name, out, d.read_segment_end()?));
        }
    }
    Ok(segments)
}

fn text(len: usize) -> Vec<u8> {
    let words = ["the ", "quick ", "brown ", "fox ", "jumps ", "over ", "lazy ", "dog\n"];
    let mut rng = StdRng::seed_from_u64(3);
    let mut out = Vec::new();
    while out.len() < len {
        out.extend_from_slice(words[rng.gen_range(0..words.len())].as_bytes());
    }
    out.truncate(len);
    out
}

#[rstest]
fn named_then_continued_segments(
    #[values(Level::Fast.model(), stored())] model: Model,
    #[values(ExecMode::Interpret, ExecMode::Translate)] mode: ExecMode,
) {
    let data = text(3000);
    let bytes = archive(&model, &[(&b"notes.txt"[..], &data[..1000]), (b"", &data[1000..2000]), (b"", &data[2000..])]);

    let mut d = Decompresser::new(SliceReader::new(&bytes)).with_mode(mode);
    assert!(d.find_block().unwrap());
    let mut names = Vec::new();
    let mut out = Vec::new();
    while let Some(name) = d.find_filename().unwrap() {
        assert_eq!(d.read_comment().unwrap(), b"");
        d.decompress(&mut out).unwrap();
        assert!(matches!(d.read_segment_end().unwrap(), SegmentCheck::Verified(_)));
        names.push(name);
    }
    assert_eq!(names, [&b"notes.txt"[..], b"", b""]);
    assert_eq!(out, data);
    assert!(!d.find_block().unwrap());
}

#[test]
fn blocks_are_found_after_other_data() {
    let mut bytes = b"#!/bin/sh\nexit 0\n".to_vec();
    bytes.extend(archive(&Level::Fast.model(), &[(&b"a"[..], &b"first"[..])]));
    bytes.extend(b"padding");
    bytes.extend(archive(&Level::Mid.model(), &[(&b"b"[..], &b"second"[..])]));

    let segments = extract(&bytes, ExecMode::Translate).unwrap();
    let names: Vec<_> = segments.iter().map(|(name, data, _)| (name.clone(), data.clone())).collect();
    assert_eq!(names, [(b"a".to_vec(), b"first".to_vec()), (b"b".to_vec(), b"second".to_vec())]);
}

#[test]
fn no_locator_means_no_block() {
    let mut d = Decompresser::new(SliceReader::new(b"nothing to see here"));
    assert!(!d.find_block().unwrap());
    assert!(d.find_filename().unwrap().is_none());
}

#[test]
fn stored_chunks_span_many_segments() {
    let mut rng = StdRng::seed_from_u64(9);
    let data: Vec<u8> = (0..3 * MAX_CHUNK + 17).map(|_| rng.gen()).collect();
    let bytes = archive(&stored(), &[(&b"big"[..], &data[..]), (b"", b"tail")]);
    assert_eq!(bytes[LOCATOR.len() + 3], LEVEL_STORED);

    let segments = extract(&bytes, ExecMode::Translate).unwrap();
    assert_eq!(segments[0].1, data);
    assert_eq!(segments[1].1, b"tail");
}

#[rstest]
fn delta_program_runs_across_segments(#[values(Level::Fast.model(), stored())] model: Model) {
    let model = model.with_pcomp(Filter::Delta.program(), 0, 0);
    let data = text(500);

    let mut compressor = Compressor::new(Vec::new());
    let mut filter = Filter::Delta.encoder();
    compressor.start_block(&model).unwrap();
    for (name, part) in [(&b"f"[..], &data[..200]), (b"", &data[200..])] {
        let mut filtered = Vec::new();
        filter.apply(part, &mut filtered);
        compressor.start_segment(name, b"").unwrap();
        compressor.compress(&filtered).unwrap();
        compressor.end_segment(Some(&Sha1::digest(part))).unwrap();
    }
    compressor.end_block().unwrap();

    let segments = extract(&compressor.into_inner(), ExecMode::Translate).unwrap();
    assert_eq!(segments[0].1, &data[..200]);
    assert_eq!(segments[1].1, &data[200..]);
    assert!(segments.iter().all(|(_, _, check)| matches!(check, SegmentCheck::Verified(_))));
}

#[test]
fn comments_and_missing_hashes() {
    let mut compressor = Compressor::new(Vec::new());
    compressor.start_block(&Level::Fast.model()).unwrap();
    compressor.start_segment(b"x", b"2024-01-01 12:00 +rw").unwrap();
    compressor.compress(b"payload").unwrap();
    compressor.end_segment(None).unwrap();
    compressor.end_block().unwrap();
    let bytes = compressor.into_inner();

    let mut d = Decompresser::new(SliceReader::new(&bytes));
    assert!(d.find_block().unwrap());
    assert_eq!(d.find_filename().unwrap().unwrap(), b"x");
    assert_eq!(d.read_comment().unwrap(), b"2024-01-01 12:00 +rw");
    let mut out = Vec::new();
    d.decompress(&mut out).unwrap();
    assert_eq!(out, b"payload");
    assert_eq!(d.read_segment_end().unwrap(), SegmentCheck::Unchecked);
}

#[test]
fn hash_mismatch_is_reported_not_fatal() {
    let mut bytes = archive(&Level::Fast.model(), &[(&b"x"[..], &b"some content"[..])]);
    // last byte of the stored hash, just before the block end marker
    let at = bytes.len() - 2;
    bytes[at] ^= 1;

    let segments = extract(&bytes, ExecMode::Translate).unwrap();
    assert_eq!(segments[0].1, b"some content");
    let check = segments[0].2;
    assert!(matches!(check, SegmentCheck::Mismatch { .. }), "{check:?}");
    assert!(!check.is_ok());
}

#[test]
fn skipped_segments() {
    let data = text(2000);
    let parts: [(&[u8], &[u8]); 3] = [(b"a", &data[..700]), (b"b", &data[700..1400]), (b"c", &data[1400..])];

    // a stored block that passes bytes through can resume after a skip
    let bytes = archive(&stored(), &parts);
    let mut d = Decompresser::new(SliceReader::new(&bytes));
    assert!(d.find_block().unwrap());
    d.find_filename().unwrap();
    d.skip().unwrap();
    assert!(matches!(d.read_segment_end().unwrap(), SegmentCheck::Skipped(_)));
    d.find_filename().unwrap();
    let mut out = Vec::new();
    d.decompress(&mut out).unwrap();
    assert_eq!(out, &data[700..1400]);

    // a modeled block cannot
    let bytes = archive(&Level::Mid.model(), &parts);
    let mut d = Decompresser::new(SliceReader::new(&bytes));
    assert!(d.find_block().unwrap());
    assert_eq!(d.find_filename().unwrap().unwrap(), b"a");
    d.skip().unwrap();
    assert!(matches!(d.read_segment_end().unwrap(), SegmentCheck::Skipped(_)));
    assert_eq!(d.find_filename().unwrap().unwrap(), b"b");
    assert!(matches!(d.decompress(&mut Vec::new()), Err(Error::Corrupt { .. })));
}

#[test]
fn listing_skips_all_data() {
    let bytes = [
        archive(&Level::Fast.model(), &[(&b"one"[..], &b"1111"[..]), (b"two", b"2222")]),
        archive(&stored(), &[(&b"three"[..], &b"3333"[..])]),
    ]
    .concat();
    let segments = Decompresser::new(SliceReader::new(&bytes)).list().unwrap();
    let names: Vec<_> = segments.iter().map(|s| (s.block, s.name.as_slice())).collect();
    assert_eq!(names, [(0, &b"one"[..]), (0, b"two"), (1, b"three")]);
    assert!(segments.iter().all(|s| matches!(s.check, SegmentCheck::Skipped(_))));
}

#[rstest]
fn truncation_is_an_error(#[values(Level::Fast.model(), Level::Max.model(), stored())] model: Model) {
    let bytes = archive(&model, &[(&b"t"[..], &text(1500)[..])]);
    // cut inside the header, inside the data and inside the trailer
    for len in [LOCATOR.len() + 8, bytes.len() / 2, bytes.len() - 10] {
        let result = extract(&bytes[..len], ExecMode::Translate);
        assert!(matches!(result, Err(Error::UnexpectedEof { .. })), "{len}: {result:?}");
    }
}

#[test]
fn rejects_unknown_levels() {
    let mut bytes = archive(&Level::Fast.model(), &[(&b"x"[..], &b"y"[..])]);
    bytes[LOCATOR.len() + 3] = 3;
    assert!(matches!(extract(&bytes, ExecMode::Translate), Err(Error::Corrupt { .. })));

    let mut bytes = archive(&stored(), &[(&b"x"[..], &b"y"[..])]);
    bytes[LOCATOR.len() + 3] = LEVEL_MODELED;
    assert!(matches!(extract(&bytes, ExecMode::Translate), Err(Error::Corrupt { .. })));
}

#[test]
fn bad_segment_marker_ends_the_block() {
    let mut bytes = archive(&Level::Fast.model(), &[(&b"x"[..], &b"y"[..])]);
    let header = LOCATOR.len() + 5 + Level::Fast.header().len();
    bytes[header] = 7;
    let mut d = Decompresser::new(SliceReader::new(&bytes));
    assert!(d.find_block().unwrap());
    assert!(d.find_filename().unwrap().is_none());
}

#[test]
fn misuse_is_an_error() {
    let mut compressor = Compressor::new(Vec::new());
    assert!(compressor.start_segment(b"x", b"").is_err());
    compressor.start_block(&Level::Fast.model()).unwrap();
    assert!(compressor.compress(b"x").is_err());
    assert!(compressor.start_segment(b"a\0b", b"").is_err());
    compressor.start_segment(b"x", b"").unwrap();
    assert!(compressor.end_block().is_err());
}

#[test]
fn context_fault_reports_the_data_offset() {
    let model = config::compile("comp 0 0 0 0 1 0 icm 4 hcomp a== 66 if error endif halt post 0 end").unwrap();
    let mut compressor = Compressor::new(Vec::new());
    compressor.start_block(&model).unwrap();
    compressor.start_segment(b"x", b"").unwrap();
    let err = compressor.compress(b"aaaaBaaa").unwrap_err();
    assert!(matches!(err, Error::Vm { program: ProgramKind::Context, offset: 4, .. }), "{err}");
}

#[test]
fn post_fault_reports_the_archive_offset() {
    let pcomp = config::compile("comp 0 0 0 0 0 hcomp pcomp x ; a== 66 if error endif halt end").unwrap().pcomp;
    let model = stored().with_pcomp(pcomp, 0, 0);
    let mut compressor = Compressor::new(Vec::new());
    compressor.start_block(&model).unwrap();
    compressor.start_segment(b"x", b"").unwrap();
    compressor.compress(b"aaaaBaaa").unwrap();
    compressor.end_segment(None).unwrap();
    compressor.end_block().unwrap();
    let bytes = compressor.into_inner();

    // the data 'B' follows the program's own 66
    let after_b = bytes.iter().rposition(|&b| b == b'B').unwrap() as u64 + 1;
    let err = extract(&bytes, ExecMode::Interpret).unwrap_err();
    assert!(matches!(err, Error::Vm { program: ProgramKind::PostProcess, offset, .. } if offset == after_b), "{err}");
}
