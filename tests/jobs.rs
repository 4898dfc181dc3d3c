use std::collections::HashSet;
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use trip_star::loader::Source;
use trip_star::sampler::{run_sample, SampleConfig};
use trip_star::star::{run_transform, TransformConfig};
use trip_star::EtlError;

const TRIPS: &str = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,pickup_longitude,pickup_latitude,RatecodeID,store_and_fwd_flag,dropoff_longitude,dropoff_latitude,payment_type,fare_amount,extra,mta_tax,tip_amount,tolls_amount,improvement_surcharge,total_amount
1,2016-03-01 00:00:00,2016-03-01 00:07:55,1,2.5,-73.976746,40.765152,1,N,-74.004265,40.746128,1,9,0.5,0.5,2.05,0,0.3,12.35
1,2016-03-01 00:00:00,2016-03-01 00:11:06,1,2.9,-73.983482,40.767925,1,N,-74.005943,40.733166,1,11,0.5,0.5,3.05,0,0.3,15.35
2,2016-03-01 00:00:00,2016-03-01 00:31:06,2,19.98,-73.782021,40.644810,1,N,-73.974541,40.675770,1,54.5,0.5,0.5,8,0,0.3,63.8
2,2016-03-01 00:00:00,2016-03-01 00:07:55,3,2.5,-73.976746,40.765152,99,N,-74.004265,40.746128,2,9,0.5,0.5,0,0,0.3,10.3
";

fn workdir() -> TempDir {
    tempfile::Builder::new().prefix("trip_star").tempdir().unwrap()
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn transform_job_writes_star_schema() {
    let _ = env_logger::try_init();
    let dir = workdir();
    let input = dir.path().join("uber_data.csv");
    fs::write(&input, TRIPS).unwrap();
    let out = dir.path().join("star");

    let config = TransformConfig {
        source: Source::Path(input),
        verify: true,
        output_dir: Some(out.clone()),
        ..TransformConfig::default()
    };
    let star = run_transform(&config).await.unwrap();
    assert_eq!(star.fact.num_rows(), 4);
    assert_eq!(star.rate_code.len(), 2);

    let fact = lines(&out.join("fact_table.csv"));
    assert_eq!(fact.len(), 5);
    assert!(fact[0].starts_with("VendorID,datetime_id,passenger_count_id,"));

    let rate_codes = lines(&out.join("rate_code_dim.csv"));
    assert_eq!(
        rate_codes,
        vec![
            "rate_code_id,RatecodeID,rate_code_name".to_string(),
            "0,1,Standard rate".to_string(),
            "1,99,".to_string(),
        ]
    );

    let datetimes = lines(&out.join("datetime_dim.csv"));
    assert_eq!(datetimes.len(), 4);
    assert!(datetimes[1].starts_with("0,2016-03-01 00:00:00,2016-03-01 00:07:55,0,1,3,2016,1,"));
}

#[tokio::test]
async fn transform_job_rejects_incomplete_schema() {
    let dir = workdir();
    let input = dir.path().join("uber_data.csv");
    let truncated: String = TRIPS
        .lines()
        .map(|l| l.rsplit_once(',').unwrap().0.to_string() + "\n")
        .collect();
    fs::write(&input, truncated).unwrap();

    let config = TransformConfig {
        source: Source::Path(input),
        ..TransformConfig::default()
    };
    let err = run_transform(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::MissingColumn(name) if name == "total_amount"));
}

#[tokio::test]
async fn missing_input_file_is_an_io_error() {
    let dir = workdir();
    let input = dir.path().join("tripdata_july_2024.csv");

    let config = SampleConfig {
        input: input.clone(),
        output: dir.path().join("modified_file.csv"),
        ..SampleConfig::default()
    };
    let err = run_sample(&config).await.unwrap_err();
    assert!(matches!(&err, EtlError::Io { path, .. } if path == &input));
    assert!(err.to_string().contains("tripdata_july_2024.csv"));

    let config = TransformConfig {
        source: Source::Path(dir.path().to_path_buf()),
        ..TransformConfig::default()
    };
    let err = run_transform(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::Io { .. }));
}

fn sampling_input() -> String {
    let mut csv = String::from("id,fare_amount,Airport_fee\n");
    for id in 0..10 {
        // rows 2, 5 and 8 miss a required value
        let fare = if id == 2 { String::new() } else { format!("{id}.5") };
        let fee = if id == 5 || id == 8 { "" } else { "1.75" };
        csv.push_str(&format!("{id},{fare},{fee}\n"));
    }
    csv
}

fn sampled_ids(path: &Path) -> Vec<u32> {
    lines(path)
        .iter()
        .skip(1)
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect()
}

#[tokio::test]
async fn sampling_job_is_seeded_and_skips_incomplete_rows() {
    let _ = env_logger::try_init();
    let dir = workdir();
    let input = dir.path().join("tripdata.csv");
    fs::write(&input, sampling_input()).unwrap();

    let config = |output: &str| SampleConfig {
        input: input.clone(),
        output: dir.path().join(output),
        required_columns: vec!["fare_amount".to_string(), "Airport_fee".to_string()],
        sample_size: 5,
        seed: 1,
    };

    let first = run_sample(&config("a.csv")).await.unwrap();
    assert_eq!(first.input_rows, 10);
    assert_eq!(first.complete_rows, 7);
    assert_eq!(first.sampled_rows, 5);

    run_sample(&config("b.csv")).await.unwrap();
    let a = sampled_ids(&dir.path().join("a.csv"));
    let b = sampled_ids(&dir.path().join("b.csv"));
    assert_eq!(a, b);
    assert_eq!(a.len(), 5);

    let distinct: HashSet<u32> = a.iter().copied().collect();
    assert_eq!(distinct.len(), 5);
    for dropped in [2, 5, 8] {
        assert!(!distinct.contains(&dropped));
    }

    assert_eq!(
        lines(&dir.path().join("a.csv"))[0],
        "id,fare_amount,Airport_fee"
    );
}

#[tokio::test]
async fn sampling_more_rows_than_available_is_fatal() {
    let dir = workdir();
    let input = dir.path().join("tripdata.csv");
    fs::write(&input, sampling_input()).unwrap();
    let output = dir.path().join("sample.csv");

    let config = SampleConfig {
        input,
        output: output.clone(),
        required_columns: vec!["fare_amount".to_string(), "Airport_fee".to_string()],
        sample_size: 8,
        seed: 1,
    };
    let err = run_sample(&config).await.unwrap_err();
    assert!(matches!(
        err,
        EtlError::InsufficientRows {
            requested: 8,
            available: 7
        }
    ));
    assert!(!output.exists());
}
