use std::env;

use anyhow::{Context, Result, bail};
use log::info;
use voicemap_eval::{
    config::EvalConfig,
    data::{FewShotDataset, stack_task},
    evaluate, n_shot_k_way_evaluation,
};

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: voicemap-eval <config.json>");
    };

    let config = EvalConfig::from_path(&path).with_context(|| format!("loading {path}"))?;
    let mut model = config.build_model().context("building model")?;
    let dataset = config.build_dataset().context("building dataset")?;
    info!("evaluating {} samples from {path}", dataset.len());

    let loss_fn = config.loss_fn();
    let mut logs = evaluate(
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
    .context("evaluating model")?;

    if let Some(few_shot) = &config.few_shot {
        let mut tasks = FewShotDataset::from_dataset(&dataset, config.seed())?;
        let accuracy = n_shot_k_way_evaluation(&mut model, &mut tasks, stack_task, few_shot)
            .context("few-shot evaluation")?;

        let key = format!("{}-shot_{}-way_acc", few_shot.n, few_shot.k);
        logs.insert(config.log_keys().key(&key), accuracy);
    }

    println!("{}", serde_json::to_string_pretty(&logs)?);

    Ok(())
}
