use std::{collections::HashMap, fs::File};

use serde::Deserialize;
use serde_json::{Map, Value};

use growthbook::{
    eval_condition, eval_feature, hash, run_experiment, Attributes, Condition, Configuration,
    EvalOptions, Experiment, FeatureSource, SavedGroups, UserContext,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionCase {
    name: String,
    condition: Value,
    attributes: Attributes,
    #[serde(default)]
    saved_groups: SavedGroups,
    expected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureCase {
    name: String,
    features: Value,
    attributes: Attributes,
    #[serde(default)]
    forced_variations: HashMap<String, usize>,
    #[serde(default)]
    url: Option<String>,
    key: String,
    expected: ExpectedFeature,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpectedFeature {
    value: Value,
    source: FeatureSource,
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    variation_id: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperimentCase {
    name: String,
    experiment: Experiment,
    attributes: Attributes,
    #[serde(default)]
    forced_variations: HashMap<String, usize>,
    #[serde(default)]
    url: Option<String>,
    expected: ExpectedExperiment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpectedExperiment {
    value: Value,
    variation_id: usize,
    in_experiment: bool,
    hash_used: bool,
}

fn read<T: for<'de> Deserialize<'de>>(path: &str) -> Vec<T> {
    serde_json::from_reader(File::open(path).unwrap()).unwrap()
}

fn user(attributes: Attributes, forced_variations: HashMap<String, usize>, url: Option<String>) -> UserContext {
    UserContext {
        attributes,
        forced_variations,
        url: url.map(|url| url.parse().unwrap()),
        ..Default::default()
    }
}

#[test]
fn hash_test_data() {
    let cases: Vec<(String, String, i64, Option<f64>)> = read("tests/data/hash.json");

    for (seed, value, version, expected) in cases {
        print!("hash({seed:?}, {value:?}, {version}) ... ");
        match (hash(&seed, &value, version), expected) {
            (Some(actual), Some(expected)) => assert!((actual - expected).abs() < 1e-9),
            (actual, expected) => assert_eq!(actual, expected),
        }
        println!("ok");
    }
}

#[test]
fn condition_test_data() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cases: Vec<ConditionCase> = read("tests/data/conditions.json");

    for case in cases {
        print!("condition {:?} ... ", case.name);
        let condition = Condition::from(case.condition);
        assert_eq!(
            eval_condition(&case.attributes, &condition, &case.saved_groups),
            case.expected,
            "{}",
            case.name
        );
        println!("ok");
    }
}

#[test]
fn feature_test_data() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cases: Vec<FeatureCase> = read("tests/data/features.json");

    for case in cases {
        print!("feature {:?} ... ", case.name);
        let configuration =
            Configuration::from_json(&case.features.to_string(), None).unwrap();
        let mut user = user(case.attributes, case.forced_variations, case.url);

        let result = eval_feature(
            Some(&configuration),
            &EvalOptions::default(),
            &mut user,
            &case.key,
            None,
        );

        assert_eq!(result.source(), case.expected.source, "{}", case.name);
        assert_eq!(
            result.value().unwrap_or(&Value::Null),
            &case.expected.value,
            "{}",
            case.name
        );
        if let Some(rule_id) = &case.expected.rule_id {
            assert_eq!(result.rule_id(), Some(rule_id.as_str()), "{}", case.name);
        }
        if let Some(variation_id) = case.expected.variation_id {
            let experiment_result = result.experiment_result().unwrap();
            assert_eq!(experiment_result.variation_id, variation_id, "{}", case.name);
            assert_eq!(
                experiment_result.feature_id.as_deref(),
                Some(case.key.as_str())
            );
        }
        println!("ok");
    }
}

#[test]
fn experiment_test_data() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cases: Vec<ExperimentCase> = read("tests/data/experiments.json");

    for case in cases {
        print!("experiment {:?} ... ", case.name);
        let mut user = user(case.attributes, case.forced_variations, case.url);

        let result = run_experiment(None, &EvalOptions::default(), &mut user, &case.experiment);

        assert_eq!(result.value.as_ref(), Some(&case.expected.value), "{}", case.name);
        assert_eq!(result.variation_id, case.expected.variation_id, "{}", case.name);
        assert_eq!(result.in_experiment, case.expected.in_experiment, "{}", case.name);
        assert_eq!(result.hash_used, case.expected.hash_used, "{}", case.name);
        println!("ok");
    }
}

#[test]
fn feature_result_wire_format() {
    let configuration = Configuration::from_json(
        r#"{"feature": {"defaultValue": "default", "rules": [{"id": "r1", "key": "exp1", "variations": ["a", "b"], "hashVersion": 2}]}}"#,
        None,
    )
    .unwrap();
    let mut attributes = Map::new();
    attributes.insert("id".to_owned(), Value::from("123"));
    let mut user = UserContext::new(attributes);

    let result = eval_feature(
        Some(&configuration),
        &EvalOptions::default(),
        &mut user,
        "feature",
        None,
    );
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["value"], "a");
    assert_eq!(json["on"], true);
    assert_eq!(json["off"], false);
    assert_eq!(json["source"], "experiment");
    assert_eq!(json["ruleId"], "r1");
    assert_eq!(json["experiment"]["key"], "exp1");
    assert_eq!(json["experimentResult"]["variationId"], 0);
    assert_eq!(json["experimentResult"]["inExperiment"], true);
    assert_eq!(json["experimentResult"]["hashAttribute"], "id");
    assert_eq!(json["experimentResult"]["hashValue"], "123");
    assert_eq!(json["experimentResult"]["featureId"], "feature");
    assert_eq!(json["experimentResult"]["bucket"], 0.3022);
}
