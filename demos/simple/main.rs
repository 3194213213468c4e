use growthbook::{ClientConfig, Experiment, ExperimentResult};

const FEATURES: &str = r#"{
    "banner-text": {
        "defaultValue": "Welcome!",
        "rules": [
            {"condition": {"country": "france"}, "force": "Bienvenue !"},
            {"key": "banner-test", "variations": ["Welcome!", "Hello there!"], "hashVersion": 2}
        ]
    },
    "dark-mode": {"defaultValue": false, "rules": [{"force": true, "coverage": 0.5}]}
}"#;

pub fn main() {
    env_logger::init();

    let mut config = ClientConfig::new();
    config.tracking_callback(|experiment: &Experiment, result: &ExperimentResult| {
        println!(
            "Exposure: experiment={} variation={}",
            experiment.key, result.key
        );
    });
    let client = config.to_client();

    client.set_features_json(FEATURES).unwrap();
    client
        .set_attributes_json(r#"{"id": "user-123", "country": "canada"}"#)
        .unwrap();

    let banner = client.get_feature_value("banner-text", String::from("Welcome!"));
    println!("Banner: {banner}");
    println!("Dark mode: {}", client.is_on("dark-mode"));
}
