#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic, clippy::float_cmp)]
//! End-to-end tests of the tick pipeline
//!
//! Archives are built into temporary files and read back through the real
//! readers, so every test exercises archive load, block streaming, request
//! resolution, command parsing, layout and the display lifecycle together.

use caption_cache::{
    BlockState, CaptionConfig, CaptionHints, CaptionSystem, FileBlockReader, FontStyle,
    MonospaceMeasurer, QueuedBlockReader, Rgb, TokioBlockReader,
};
use caption_formats::ArchiveBuilder;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ADVANCE: u32 = 10;
const LINE: u32 = 20;

fn write_archive(dir: &Path, name: &str, block_size: u32, entries: &[(&str, &str)]) -> PathBuf {
    let mut builder = ArchiveBuilder::new(block_size);
    for (key, text) in entries {
        builder.add(key, text).expect("add caption");
    }
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create archive");
    builder.write(&mut file).expect("write archive");
    path
}

fn measurer() -> MonospaceMeasurer {
    MonospaceMeasurer::new(ADVANCE, LINE)
}

fn file_system(
    entries: &[(&str, &str)],
    config: CaptionConfig,
) -> (TempDir, CaptionSystem<FileBlockReader, MonospaceMeasurer>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_archive(dir.path(), "captions.dat", 512, entries);
    let mut system =
        CaptionSystem::new(config, FileBlockReader::new(), measurer()).expect("system");
    system.load_archive(&path).expect("load archive");
    (dir, system)
}

fn visible_texts<R, M>(system: &CaptionSystem<R, M>) -> Vec<String>
where
    R: caption_cache::BlockReader,
    M: caption_cache::TextMeasurer,
{
    system
        .visible_items()
        .iter()
        .map(|v| v.item.text().to_string())
        .collect()
}

#[test]
fn colour_runs_lay_out_on_one_line() {
    let (_dir, mut system) = file_system(
        &[("hello", "<clr:255,0,0>Hello<clr> World")],
        CaptionConfig::default(),
    );

    system
        .request_caption("hello", CaptionHints::default())
        .expect("key exists");
    system.tick(1.0 / 60.0);

    let visible = system.visible_items();
    assert_eq!(visible.len(), 1);
    let units = visible[0].item.units();
    assert_eq!(units.len(), 2);

    assert_eq!(units[0].text, "Hello");
    assert_eq!(units[0].color, Rgb::new(255, 0, 0));
    assert_eq!(units[1].text, " World");
    assert_eq!(units[1].color, Rgb::WHITE);
    assert_eq!(units[0].y, units[1].y);
    assert_eq!(units[1].x, 5 * ADVANCE);
    assert!(units.iter().all(|u| u.font == FontStyle::Normal));
}

#[test]
fn no_repeat_interval_suppresses_within_window() {
    let (_dir, mut system) = file_system(
        &[("alarm", "<norepeat:4>Alarm!")],
        CaptionConfig::default(),
    );

    let first = system.request_caption("alarm", CaptionHints::default());
    system.tick(1.0); // clock 1: shown
    assert_eq!(system.display().len(), 1);

    system.tick(1.0);
    system.request_caption("alarm", CaptionHints::default());
    system.tick(1.0); // clock 3: two seconds later, suppressed
    assert_eq!(system.display().len(), 1);
    assert_eq!(system.display().items().next().map(|i| i.id()), first);

    system.tick(1.0);
    system.tick(1.0); // clock 5: the first caption has expired
    let third = system.request_caption("alarm", CaptionHints::default());
    system.tick(1.0); // clock 6: five seconds after the first, allowed
    let ids: Vec<_> = system.display().items().map(|i| Some(i.id())).collect();
    assert_eq!(ids, vec![third]);
}

#[test]
fn sentence_assembles_across_blocks() {
    let dir = tempfile::tempdir().unwrap();
    // 32-byte blocks spread the words over three blocks
    let path = write_archive(
        dir.path(),
        "sentence.dat",
        32,
        &[
            ("w.the", "The"),
            ("w.reactor", "reactor core"),
            ("w.is", "is"),
            ("w.unstable", "unstable"),
        ],
    );

    let mut system =
        CaptionSystem::new(CaptionConfig::default(), QueuedBlockReader::new(), measurer())
            .unwrap();
    let archive = system.load_archive(&path).unwrap();

    system
        .request_sentence(
            &["w.the", "w.reactor", "w.is", "w.unstable"],
            CaptionHints::default(),
        )
        .expect("all keys exist");

    // Nothing shows until every block has arrived
    system.tick(0.1);
    assert!(system.display().is_empty());
    assert!(
        system
            .block_states(archive)
            .unwrap()
            .contains(&BlockState::Pending)
    );

    system.cache().reader().complete_all();
    system.tick(0.1);
    assert_eq!(visible_texts(&system), vec!["The reactor core is unstable"]);
}

#[test]
fn missing_key_shows_nothing() {
    let (_dir, mut system) = file_system(&[("present", "Here")], CaptionConfig::default());

    let hints = CaptionHints::default().warn_if_missing();
    assert!(system.request_caption("absent", hints).is_none());
    assert!(system.request_caption("absent", hints).is_none());
    assert!(
        system
            .request_sentence(&["present", "absent"], hints)
            .is_none()
    );
    system.tick(0.1);

    assert!(system.display().is_empty());
    assert_eq!(system.diagnostics().missing_keys, 3);
    assert_eq!(system.diagnostics().reads_issued, 0);
}

#[test]
fn read_failure_drops_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_archive(dir.path(), "vanishing.dat", 128, &[("line", "Gone")]);

    let mut system =
        CaptionSystem::new(CaptionConfig::default(), FileBlockReader::new(), measurer()).unwrap();
    let archive = system.load_archive(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(
        system
            .request_caption("line", CaptionHints::default())
            .is_some()
    );
    system.tick(0.1);

    assert!(system.display().is_empty());
    assert_eq!(system.outstanding_requests(), 0);
    assert_eq!(system.diagnostics().failures, 1);
    assert_eq!(
        system.block_states(archive).unwrap(),
        vec![BlockState::Absent]
    );
}

#[test]
fn rejected_archive_is_never_consulted() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_archive(dir.path(), "good.dat", 128, &[("line", "Good")]);
    let bad = dir.path().join("bad.dat");
    let mut bytes = std::fs::read(&good).unwrap();
    bytes[4] = 99; // version
    std::fs::write(&bad, bytes).unwrap();

    let mut system =
        CaptionSystem::new(CaptionConfig::default(), FileBlockReader::new(), measurer()).unwrap();
    assert!(system.load_archive(&bad).is_err());
    assert!(
        system
            .request_caption("line", CaptionHints::default())
            .is_none()
    );
    assert_eq!(system.diagnostics().archives, 0);
}

#[test]
fn items_retire_oldest_first() {
    let (_dir, mut system) = file_system(
        &[("long", "Long lived"), ("short", "Short lived")],
        CaptionConfig::default(),
    );

    system.request_caption("long", CaptionHints::default().with_duration(3.0));
    system.request_caption("short", CaptionHints::default().with_duration(1.0));
    system.tick(0.0); // both shown

    system.tick(2.0);
    let ttls: Vec<f32> = system
        .display()
        .items()
        .map(caption_cache::DisplayItem::ttl_remaining)
        .collect();
    // The short caption has expired but is held behind the long one
    assert_eq!(ttls, vec![1.0, 0.0]);

    system.tick(1.0);
    assert!(system.display().is_empty());
}

#[test]
fn speaker_variants_follow_hints() {
    let (_dir, mut system) = file_system(
        &[("intro", "<playerclr:0,255,0:0,0,255><gender:I am:You are> ready")],
        CaptionConfig::default(),
    );

    system.request_caption("intro", CaptionHints::default().from_speaker());
    system.tick(0.1);
    system.request_caption("intro", CaptionHints::default());
    system.tick(0.1);

    let visible = system.visible_items();
    assert_eq!(visible[0].item.text(), "I am ready");
    assert!(visible[0].item.is_from_speaker());
    assert_eq!(visible[0].item.units()[0].color, Rgb::new(0, 255, 0));
    assert_eq!(visible[1].item.text(), "You are ready");
    assert_eq!(visible[1].item.units()[0].color, Rgb::new(0, 0, 255));
    assert_eq!(visible[1].y, LINE + system.config().item_spacing);
}

#[test]
fn overflowing_caption_pans_then_retires() {
    let config = CaptionConfig::default()
        .with_viewport(50, 2 * LINE)
        .with_fades(0.0, 0.0, 0.0);
    let (_dir, mut system) = file_system(&[("speech", "one two three four")], config);

    system.request_caption("speech", CaptionHints::default().with_duration(4.0));
    system.tick(0.0);

    let offsets = system.display().items().next().unwrap().pan_offsets(2 * LINE);
    assert_eq!(offsets, vec![0, LINE, 2 * LINE]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(system.visible_items()[0].pan_offset);
        system.tick(1.0);
    }
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&(2 * LINE)));
    assert!(system.display().is_empty());
}

#[test]
fn flush_forces_reread() {
    let (_dir, mut system) = file_system(&[("a", "A")], CaptionConfig::default());

    system.request_caption("a", CaptionHints::default());
    system.tick(0.1);
    assert_eq!(system.diagnostics().reads_issued, 1);
    assert_eq!(system.diagnostics().resident_blocks, 1);

    system.flush_cache();
    assert_eq!(system.diagnostics().resident_bytes, 0);

    system.request_caption("a", CaptionHints::default());
    system.tick(0.1);
    assert_eq!(system.diagnostics().reads_issued, 2);
    // Repeat records were flushed too, so the caption shows again
    assert_eq!(system.display().len(), 2);
}

#[test]
fn tokio_reader_completes_across_threads() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_archive(dir.path(), "async.dat", 256, &[("async", "From a worker")]);

    let mut system = CaptionSystem::new(
        CaptionConfig::default(),
        TokioBlockReader::new(runtime.handle().clone()),
        measurer(),
    )
    .unwrap();
    system.load_archive(&path).unwrap();
    system
        .request_caption("async", CaptionHints::default())
        .unwrap();

    for _ in 0..500 {
        system.tick(0.001);
        if !system.display().is_empty() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    assert_eq!(
        system.display().items().next().map(|i| i.text().to_string()),
        Some("From a worker".to_string())
    );

    // Flushing from a plain thread waits for anything still in flight
    system.flush_cache();
    system.request_caption("async", CaptionHints::default());
    assert_eq!(system.cache().outstanding_reads(), 1);
    system.flush_cache();
    assert_eq!(system.cache().outstanding_reads(), 0);
}
