use voicemap_eval::{
    config::EvalConfig,
    data::{FewShotDataset, stack_task},
    evaluate, n_shot_k_way_evaluation,
};

const CONFIG: &str = r#"{
    "model": {
        "sequential": {
            "layers": [
                { "dense": { "dim": [2, 4], "act_fn": "tanh" } },
                { "dropout": { "p": 0.2 } },
                { "dense": { "dim": [4, 3], "act_fn": null } }
            ],
            "init": { "normal": { "mean": 0.0, "std_dev": 0.5 } }
        }
    },
    "dataset": {
        "inline": {
            "data": [
                0.0, 0.1, 0,   0.1, 0.0, 0,   0.2, 0.1, 0,
                1.0, 1.1, 1,   1.1, 1.0, 1,   1.2, 1.1, 1,
                2.0, 2.1, 2,   2.1, 2.0, 2,   2.2, 2.1, 2
            ],
            "x_size": 2,
            "y_size": 1
        }
    },
    "batch_size": 4,
    "metrics": ["categorical_accuracy"],
    "loss": "cross_entropy",
    "prefix": "eval_",
    "few_shot": { "num_tasks": 10, "n": 1, "k": 3 },
    "seed": 42
}"#;

#[test]
fn config_drives_a_full_evaluation() {
    let config = EvalConfig::from_json(CONFIG).unwrap();
    let mut model = config.build_model().unwrap();
    let dataset = config.build_dataset().unwrap();
    let params = model.params().to_vec();

    let loss_fn = config.loss_fn();
    let logs = evaluate(
        &mut model,
        dataset.batches(config.batch_size),
        |batch| {
            let (x, y) = batch?;
            Ok((x.to_owned(), y.to_owned()))
        },
        &config.scorers(),
        loss_fn.as_deref(),
        &config.log_keys(),
    )
    .unwrap();

    assert_eq!(logs.len(), 2);
    assert!((0. ..=1.).contains(&logs["eval_categorical_accuracy"]));
    assert!(logs["eval_loss"] > 0.);

    let few_shot = config.few_shot.unwrap();
    let mut tasks = FewShotDataset::from_dataset(&dataset, config.seed()).unwrap();
    let acc = n_shot_k_way_evaluation(&mut model, &mut tasks, stack_task, &few_shot).unwrap();
    assert!((0. ..=1.).contains(&acc));

    assert_eq!(model.params(), params.as_slice());
}

#[test]
fn rejects_bad_files() {
    assert!(EvalConfig::from_path("does/not/exist.json").is_err());
    assert!(EvalConfig::from_json("{}").is_err());
}
