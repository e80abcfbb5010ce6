//! Encodes a synthetic clip with a freshly initialized classifier.
//!
//! Run with `RUST_LOG=debug` to see per-pass corruption counts.

use anyhow::Result;
use env_logger::Env;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use temporal_bert::distillation::masked_mse;
use temporal_bert::pooling::l2_normalize;
use temporal_bert::prelude::*;

const FEATURE_WIDTH: usize = 2048;
const HIDDEN_WIDTH: usize = 512;
const CLIP_LENGTH: usize = 8;
const NUM_CLASSES: usize = 51;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = EncoderConfig::new(FEATURE_WIDTH, CLIP_LENGTH)
        .with_hidden_width(HIDDEN_WIDTH)
        .with_num_layers(2);
    println!("{}", config.to_json()?);

    let model = TemporalClassifier::from_seed(config, NUM_CLASSES, 42)?;

    let clips = Array3::from_shape_fn((4, CLIP_LENGTH, FEATURE_WIDTH), |(b, t, j)| {
        ((b * 7 + t * 3) as f32 + j as f32 * 0.01).sin().max(0.0)
    });

    let mut rng = StdRng::seed_from_u64(7);
    let train = model.forward_train(&clips.view(), &mut rng)?;
    println!(
        "train: logits {:?}, sequence {:?}, {} corrupted positions",
        train.logits.dim(),
        train.sequence_output.dim(),
        train.corruption_mask.num_corrupted()
    );
    for (b, row) in train.corruption_mask.as_array().outer_iter().enumerate() {
        let flags: String = row.iter().map(|&m| if m { 'x' } else { '.' }).collect();
        println!("  clip {}: {}", b, flags);
    }

    // Self-distillation: the eval pass is the target for corrupted positions.
    let eval = model.forward(&clips.view(), &mut ForwardMode::Eval)?;
    let student = l2_normalize(&train.sequence_output.view());
    let target = l2_normalize(&eval.sequence_output.view());
    let loss = masked_mse(&student.view(), &target.view(), &train.corruption_mask)?;
    println!("masked reconstruction loss: {:.6}", loss);

    let predictions = model.predict_classes(&clips.view())?;
    println!("eval predictions: {:?}", predictions);
    Ok(())
}
