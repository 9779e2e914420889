mod common;

use common::{drifting_measurements, measurements, memory_fs, sequences, TestStore};
use onesec_core::{Analysis, Recorder, WindowSpec};
use serde_json::json;

fn feed(recorder: &mut Recorder, values: &[Option<f64>]) -> Vec<u64> {
    values
        .iter()
        .map(|value| match value {
            Some(v) => recorder.append(*v).unwrap(),
            None => recorder.append_dnf().unwrap(),
        })
        .collect()
}

#[test]
fn test_round_trip_statistics_and_samples() {
    let store = TestStore::new();
    let values = measurements(137);

    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 10, &WindowSpec::defaults()).unwrap();
    feed(&mut recorder, &values);
    let stats = recorder.statistics();
    let samples = recorder.samples().unwrap();
    drop(recorder);

    let reloaded = Recorder::load(store.fs.clone(), store.root()).unwrap();
    assert_eq!(reloaded.statistics(), stats);
    assert_eq!(reloaded.samples().unwrap(), samples);
    assert_eq!(stats.total, 137);
    assert_eq!(stats.valid, values.iter().filter(|v| v.is_some()).count() as u64);
}

#[test]
fn test_resume_is_identical_to_uninterrupted() {
    let values = measurements(260);

    let uninterrupted_store = TestStore::new();
    let mut uninterrupted =
        Recorder::create(uninterrupted_store.fs.clone(), uninterrupted_store.root(), 16, &WindowSpec::defaults())
            .unwrap();
    feed(&mut uninterrupted, &values);

    // restart at several points, including before the largest window fills
    let store = TestStore::new();
    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 16, &WindowSpec::defaults()).unwrap();
    let mut fed = 0;
    for stop in [2, 50, 99, 100, 160, 176, 260] {
        feed(&mut recorder, &values[fed..stop]);
        fed = stop;
        drop(recorder);
        recorder = Recorder::load(store.fs.clone(), store.root()).unwrap();
    }

    assert_eq!(recorder.statistics(), uninterrupted.statistics());

    let tail = [Some(0.015625), None, Some(-0.25), Some(1.0)];
    for value in tail {
        match value {
            Some(v) => {
                recorder.append(v).unwrap();
                uninterrupted.append(v).unwrap();
            }
            None => {
                recorder.append_dnf().unwrap();
                uninterrupted.append_dnf().unwrap();
            }
        }
        assert_eq!(recorder.statistics(), uninterrupted.statistics());
    }
}

#[test]
fn test_resume_is_bit_identical_with_inexact_times() {
    let fs = memory_fs();
    let mut uninterrupted = Recorder::create(fs.clone(), "/uninterrupted", 16, &WindowSpec::defaults()).unwrap();
    let mut recorder = Recorder::create(fs.clone(), "/resumed", 16, &WindowSpec::defaults()).unwrap();
    let restarts = [1, 4, 57, 100, 101, 150, 250, 333];

    for (i, value) in drifting_measurements(350).into_iter().enumerate() {
        match value {
            Some(v) => {
                recorder.append(v).unwrap();
                uninterrupted.append(v).unwrap();
            }
            None => {
                recorder.append_dnf().unwrap();
                uninterrupted.append_dnf().unwrap();
            }
        }

        let appended = i + 1;
        if restarts.contains(&appended) {
            drop(recorder);
            recorder = Recorder::load(fs.clone(), "/resumed").unwrap();
        }

        let expected = uninterrupted.statistics();
        let actual = recorder.statistics();
        for (spec, stats) in &expected.windows {
            assert_eq!(actual.windows.get(spec), Some(stats), "{} after {} appends", spec, appended);
        }
        assert_eq!(actual, expected, "after {} appends", appended);
    }
}

#[test]
fn test_sequences_are_dense_from_zero() {
    let store = TestStore::new();
    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 7, &WindowSpec::defaults()).unwrap();
    let first = feed(&mut recorder, &measurements(20));
    drop(recorder);

    let mut recorder = Recorder::load(store.fs.clone(), store.root()).unwrap();
    let second = feed(&mut recorder, &measurements(5));

    let expected: Vec<u64> = (0..25).collect();
    assert_eq!([first, second].concat(), expected);
    assert_eq!(sequences(&recorder.samples().unwrap()), expected);
}

#[test]
fn test_load_uses_windows_from_manifest() {
    let store = TestStore::new();
    let windows = [WindowSpec::mean(5).unwrap(), WindowSpec::trimmed(7).unwrap()];
    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 10, &windows).unwrap();
    feed(&mut recorder, &measurements(12));
    drop(recorder);

    let reloaded = Recorder::load(store.fs.clone(), store.root()).unwrap();
    assert_eq!(reloaded.window_specs(), windows.to_vec());
    assert!(reloaded.statistics().window("mo5").is_some());
    assert!(reloaded.statistics().window("mo3").is_none());
}

#[test]
fn test_auto_open_creates_then_loads() {
    let store = TestStore::new();
    let (mut recorder, created) =
        Recorder::auto_open(store.fs.clone(), store.root(), 10, &WindowSpec::defaults()).unwrap();
    assert!(created);
    recorder.append(0.5).unwrap();
    drop(recorder);

    let (recorder, created) = Recorder::auto_open(store.fs.clone(), store.root(), 10, &WindowSpec::defaults()).unwrap();
    assert!(!created);
    assert_eq!(recorder.statistics().total, 1);
}

#[test]
fn test_auto_open_wipes_directory_without_manifest() {
    let store = TestStore::new();
    std::fs::create_dir_all(store.root()).unwrap();
    std::fs::write(store.root().join("data0.json"), "{\"records\": []}").unwrap();

    let (recorder, created) = Recorder::auto_open(store.fs.clone(), store.root(), 10, &[]).unwrap();
    assert!(created);
    assert_eq!(recorder.statistics().total, 0);
    assert!(store.root().join("manifest.json").exists());
}

#[test]
fn test_export_document() {
    let store = TestStore::new();
    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 2, &WindowSpec::defaults()).unwrap();
    recorder.append(0.125).unwrap();
    recorder.append_dnf().unwrap();
    recorder.append(-0.25).unwrap();

    let document = recorder.export().unwrap();
    assert_eq!(document["data_size"], json!(3));
    assert_eq!(document["group_size"], json!(2));
    assert_eq!(
        document["records"],
        json!([
            {"serial": 0, "time": 0.125},
            {"serial": 1, "time": null},
            {"serial": 2, "time": -0.25},
        ])
    );
}

#[test]
fn test_analysis_of_stored_samples() {
    let store = TestStore::new();
    let mut recorder = Recorder::create(store.fs.clone(), store.root(), 10, &WindowSpec::defaults()).unwrap();
    feed(&mut recorder, &measurements(40));

    let analysis = Analysis::from_samples(&recorder.samples().unwrap(), &recorder.window_specs());
    let stats = recorder.statistics();
    assert_eq!(analysis.total, stats.total);
    assert_eq!(analysis.all, stats.all);
    let ao12 = analysis.window("ao12").unwrap();
    assert_eq!(ao12.results.len(), 40);
    assert_eq!(Some(&ao12.statistics), stats.window("ao12"));
}

#[test]
fn test_delete_removes_store() {
    let store = TestStore::new();
    let recorder = Recorder::create(store.fs.clone(), store.root(), 10, &[]).unwrap();
    assert!(store.root().exists());

    assert!(recorder.delete().unwrap());
    assert!(!store.root().exists());
    assert!(Recorder::load(store.fs.clone(), store.root()).is_err());
}
