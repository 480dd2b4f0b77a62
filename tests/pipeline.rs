use mirset::analyzer::decode::SymphoniaDecoder;
use mirset::analyzer::{extract_dataset, run};
use mirset::config::ExtractConfig;
use mirset::dataset::Dataset;
use mirset::scanner::LabelMode;
use mirset::transform::FeatureKind;
use std::fs;
use std::path::Path;

/// 8000 samples per track, 4 segments of 2000, hop 300 -> 7 frames each.
fn config() -> ExtractConfig {
    ExtractConfig {
        sample_rate: 8000,
        track_duration: 1.0,
        num_segments: 4,
        n_fft: 512,
        hop_length: 300,
        num_coefficients: 13,
        n_mels: 40,
        workers: 2,
        ..Default::default()
    }
}

fn write_tone(path: &Path, sample_rate: u32, channels: u16, secs: f32, freq: f32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * secs) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let s = ((2.0 * std::f32::consts::PI * freq * t).sin() * 12000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(s).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn genre_tree(root: &Path) {
    write_tone(&root.join("classical/a.wav"), 8000, 1, 1.0, 440.0);
    // Resampled 16 kHz -> 8 kHz, still exactly 8000 samples
    write_tone(&root.join("classical/b.wav"), 16000, 2, 1.0, 220.0);
    fs::create_dir_all(root.join("metal")).unwrap();
    fs::write(root.join("metal/broken.mp3"), b"definitely not mpeg audio").unwrap();
    fs::write(root.join("metal/notes.txt"), b"liner notes").unwrap();
    // 4800 samples: two full segments, one of 800, one empty
    write_tone(&root.join("metal/short.wav"), 8000, 1, 0.6, 330.0);
}

#[test]
fn genre_tree_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    genre_tree(data.path());
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("data.json");

    let result = run(
        data.path(),
        LabelMode::Genre,
        &config(),
        &SymphoniaDecoder,
        None,
        &output,
    )
    .unwrap();

    let summary = &result.summary;
    assert_eq!(summary.classes, 2);
    assert_eq!(summary.tracks_found, 4);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(summary.decoded, 3);
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.segments_kept, 10);
    assert_eq!(summary.short_segments, 2);

    let ds = Dataset::load(&output).unwrap();
    ds.validate().unwrap();
    assert_eq!(ds.mapping, vec!["classical", "metal"]);
    let mut expected = vec![0; 8];
    expected.extend([1, 1]);
    assert_eq!(ds.labels, expected);
    assert_eq!(ds.frame_shape(), Some((7, 13)));
    assert_eq!(ds.labels, result.dataset.labels);

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let mut keys: Vec<&str> = raw.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["labels", "mapping", "mfcc"]);
}

#[test]
fn artist_tree_collapses_albums() {
    let data = tempfile::tempdir().unwrap();
    let root = data.path();
    write_tone(&root.join("aretha/live/one.wav"), 8000, 1, 1.0, 440.0);
    write_tone(&root.join("aretha/studio/two.wav"), 8000, 1, 1.0, 550.0);
    write_tone(&root.join("bowie/lodger/three.wav"), 8000, 1, 1.0, 660.0);
    // Tracks directly under an artist are not at album level
    write_tone(&root.join("bowie/stray.wav"), 8000, 1, 1.0, 660.0);

    let result =
        extract_dataset(root, LabelMode::Artist, &config(), &SymphoniaDecoder, None).unwrap();
    assert_eq!(result.dataset.mapping, vec!["aretha", "bowie"]);
    let mut expected = vec![0; 8];
    expected.extend([1; 4]);
    assert_eq!(result.dataset.labels, expected);
}

#[test]
fn reruns_write_identical_bytes() {
    let data = tempfile::tempdir().unwrap();
    genre_tree(data.path());
    let out = tempfile::tempdir().unwrap();

    let first = out.path().join("first.json");
    let second = out.path().join("second.json");
    run(data.path(), LabelMode::Genre, &config(), &SymphoniaDecoder, None, &first).unwrap();
    let sequential = ExtractConfig {
        workers: 1,
        ..config()
    };
    run(data.path(), LabelMode::Genre, &sequential, &SymphoniaDecoder, None, &second).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn combined_features_have_every_block() {
    let data = tempfile::tempdir().unwrap();
    write_tone(&data.path().join("classical/a.wav"), 8000, 1, 1.0, 440.0);
    let cfg = ExtractConfig {
        feature: FeatureKind::Combined,
        contrast_bands: 4,
        ..config()
    };

    let result =
        extract_dataset(data.path(), LabelMode::Genre, &cfg, &SymphoniaDecoder, None).unwrap();
    // 13 MFCC + 1 centroid + 12 chroma + 5 contrast
    assert_eq!(result.dataset.frame_shape(), Some((7, 31)));
    assert_eq!(result.dataset.len(), 4);
}

#[test]
fn empty_root_writes_empty_dataset() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("data.json");

    let result = run(data.path(), LabelMode::Genre, &config(), &SymphoniaDecoder, None, &output).unwrap();
    assert!(result.dataset.is_empty());
    let ds = Dataset::load(&output).unwrap();
    assert!(ds.mapping.is_empty());
    assert!(ds.labels.is_empty());
}
