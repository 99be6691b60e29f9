use std::io::Write;

use candle_core::Device;
use mindbridge_dqn::{
    AgentConfig, Difficulty, DqnError, DuelingDqnAgent, DuelingQNetwork, Recommender, State,
    TrainingConfig, agent::argmax, network::arch_path, server::parse_features,
    trainer::train_from_csv,
};

const CSV: &str = "Name,module_score,improvement_rate,moving_avg
ana,40,0,40
ben,70,0,70
ana,55,37.5,47.5
ana,62,12.7,52.3
ben,65,-7.1,67.5
ana,71,14.5,57
cy,90,0,90
ben,80,23.1,71.7
";

fn agent() -> DuelingDqnAgent {
    DuelingDqnAgent::new(
        AgentConfig {
            batch_size: 4,
            memory_size: 64,
            target_update_freq: 5,
            seed: Some(42),
            ..Default::default()
        },
        &Device::Cpu,
    )
    .unwrap()
}

#[test]
fn trained_model_is_served_with_identical_q_values() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("processed_data.csv");
    std::fs::File::create(&data_path)
        .unwrap()
        .write_all(CSV.as_bytes())
        .unwrap();

    let config = TrainingConfig {
        data_path,
        model_path: dir.path().join("model").join("dqn_model.safetensors"),
        fallback_model_path: dir.path().join("fallback.safetensors"),
        epochs: 3,
    };
    let (report, written) = train_from_csv(agent(), &config).unwrap();

    // ana: 4 rows -> 3 transitions, ben: 3 rows -> 2, cy: single row
    assert_eq!(report.episodes, 2);
    assert_eq!(report.transitions_seen, 15);
    assert_eq!(report.gradient_updates, 12);
    assert!(report.final_epsilon < 1.0);
    assert_eq!(written, config.model_path);
    assert!(arch_path(&written).exists());

    let network = DuelingQNetwork::load(&written, &Device::Cpu).unwrap();
    let recommender = Recommender::load(&written, &Device::Cpu).unwrap();

    let state = parse_features(br#"{"module_score":80,"improvement_rate":5,"moving_avg":75}"#)
        .unwrap();
    assert_eq!(state, State::new(80.0, 5.0, 75.0));

    let recommendation = recommender.recommend(&state).unwrap();
    assert_eq!(recommendation.q_values, network.predict(&state).unwrap());
    assert_eq!(recommendation.q_values.len(), 3);
    assert_eq!(
        Some(recommendation.recommended_difficulty),
        argmax(&recommendation.q_values).and_then(Difficulty::from_action)
    );

    let json = serde_json::to_value(&recommendation).unwrap();
    assert!(["Easy", "Medium", "Hard"].contains(&json["recommended_difficulty"].as_str().unwrap()));
    assert_eq!(json["q_values"].as_array().unwrap().len(), 3);
}

#[test]
fn training_without_data_reports_missing_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        data_path: dir.path().join("missing.csv"),
        model_path: dir.path().join("model.safetensors"),
        fallback_model_path: dir.path().join("fallback.safetensors"),
        epochs: 1,
    };

    let err = train_from_csv(agent(), &config).unwrap_err();
    assert!(matches!(err, DqnError::MissingData(_)));
    assert!(!config.model_path.exists());
}
