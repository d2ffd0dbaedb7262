use billscan::batch::{discover_inputs, run_batch};
use billscan::config::Config;
use billscan::pipeline::{BillPipeline, PipelineState};
use billscan::summary::BatchSummary;
use billscan_core::{ErrorKind, FieldId, Source, Stage};
use billscan_eval::GroundTruthFile;
use billscan_llm::{LlmConfig, LlmExtractor, MockLlm};
use billscan_ocr::{MockRecognizer, RegexExtractor};
use std::path::Path;
use std::sync::Arc;

const BILL_TEXT: &str = "MAHARASHTRA STATE ELECTRICITY DISTRIBUTION CO. LTD (MSEDCL)\n\
Consumer No: 1234567890\n\
Bill Amount: Rs. 1,850.50\n\
Due Date: 15/03/2024";

fn llm_response() -> String {
    let mut map = serde_json::Map::new();
    for id in FieldId::ALL {
        map.insert(id.as_str().to_string(), serde_json::Value::Null);
    }
    map.insert("consumer_number".into(), "9999999999".into());
    map.insert("consumer_name".into(), "RAMESH KUMAR".into());
    serde_json::Value::Object(map).to_string()
}

fn write_png(dir: &Path, name: &str) {
    image::GrayImage::from_fn(24, 24, |x, _| image::Luma([if x % 6 == 0 { 0 } else { 255 }]))
        .save(dir.join(name))
        .unwrap();
}

fn pipeline() -> BillPipeline {
    let llm = LlmExtractor::new(Arc::new(MockLlm::new(llm_response())), &LlmConfig::default());
    BillPipeline::new(Arc::new(MockRecognizer::new(BILL_TEXT)), RegexExtractor::default()).with_llm(Some(llm))
}

#[tokio::test]
async fn one_corrupt_file_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "a.png");
    std::fs::write(dir.path().join("b.jpg"), b"garbage").unwrap();
    write_png(dir.path(), "c.png");

    let inputs = discover_inputs(dir.path()).unwrap();
    assert_eq!(inputs.len(), 3);
    let results = run_batch(&pipeline(), &inputs, 2).await;

    assert_eq!(results.len(), 3);
    let names: Vec<&str> = results.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.jpg", "c.png"]);

    assert!(!results[0].is_failed());
    assert!(!results[2].is_failed());
    let failure = results[1].failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.kind, ErrorKind::LoadError);
    assert_eq!(results[1].state(), Some(PipelineState::Failed));

    let summary = BatchSummary::from_results(&results);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn regex_value_beats_llm_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "bill.png");
    let inputs = discover_inputs(dir.path()).unwrap();
    let results = run_batch(&pipeline(), &inputs, 1).await;

    let merged = results[0].final_result.as_ref().unwrap();
    assert_eq!(merged.value(FieldId::ConsumerNumber), Some("1234567890"));
    assert_eq!(merged.get(FieldId::ConsumerNumber).source(), Source::Regex);
    assert_eq!(merged.value(FieldId::ConsumerName), Some("RAMESH KUMAR"));
    assert_eq!(merged.get(FieldId::ConsumerName).source(), Source::Llm);
    assert_eq!(merged.value(FieldId::BillAmount), Some("1850.50"));
    assert_eq!(merged.value(FieldId::Discom), Some("MSEDCL"));
}

#[tokio::test]
async fn run_writes_records_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    std::fs::create_dir(&input).unwrap();
    write_png(&input, "bill.png");
    write_png(&input, "second.jpg");
    std::fs::write(input.join("readme.txt"), "ignored").unwrap();

    let gt = dir.path().join("ground_truth.json");
    std::fs::write(
        &gt,
        r#"[{
            "file_name": "bill.png",
            "consumer_name": "Ramesh Kumar",
            "consumer_number": "1234567890",
            "bill_amount": "1850.50",
            "due_date": "15/03/2024",
            "discom": "MSEDCL"
        }]"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.paths.input = input;
    config.paths.output = dir.path().join("output");
    config.paths.ground_truth = gt.clone();

    let p = pipeline().with_ground_truth(Arc::new(GroundTruthFile::new(&gt)));
    let (summary, summary_path) = billscan::run(&config, &p).await.unwrap();

    assert!(summary_path.ends_with("batch_summary.json"));
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.evaluated, 1);

    let out = &config.paths.output;
    assert!(out.join("bill_extracted.json").exists());
    assert!(out.join("bill_accuracy_report.json").exists());
    assert!(out.join("second_extracted.json").exists());
    assert!(!out.join("second_accuracy_report.json").exists());

    let line = summary.files.iter().find(|l| l.file == "bill.png").unwrap();
    assert!(line.evaluated);
    assert_eq!(line.correct_count, Some(11));

    // Re-scoring the saved records finds the same entry by stem.
    let report = billscan::rescore(&config).unwrap();
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files_evaluated, 1);
    assert_eq!(report.field_level_accuracy_pct, Some(100.0));
    assert!(out.join("evaluation_report.json").exists());
}

#[tokio::test]
async fn unwritable_record_is_reported_and_the_batch_goes_on() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    std::fs::create_dir(&input).unwrap();
    write_png(&input, "a.png");
    write_png(&input, "b.png");
    let output = dir.path().join("output");
    // A directory where a's record should go.
    std::fs::create_dir_all(output.join("a_extracted.json")).unwrap();

    let mut config = Config::default();
    config.paths.input = input;
    config.paths.output = output.clone();
    config.paths.ground_truth = dir.path().join("missing.json");

    let (summary, summary_path) = billscan::run(&config, &pipeline()).await.unwrap();

    assert!(summary_path.exists());
    assert!(output.join("b_extracted.json").is_file());
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);

    let a = summary.files.iter().find(|l| l.file == "a.png").unwrap();
    assert_eq!(a.status, PipelineState::Failed);
    assert!(a.error.is_none());
    assert!(a.output_error.as_deref().unwrap().contains("a_extracted.json"));
    let b = summary.files.iter().find(|l| l.file == "b.png").unwrap();
    assert_eq!(b.status, PipelineState::Done);
}
