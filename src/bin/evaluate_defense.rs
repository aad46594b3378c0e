//! Compare standard and robust ensembles under targeted PGD attacks.
//!
//! Builds ten small classifiers, wraps them in a mean-logit ensemble and a
//! crossmax-median ensemble, attacks each in turn with projected gradient
//! descent toward permuted labels, and prints the accuracy both ensembles
//! retain on the adversarial batches.
//!
//! The classifiers here are randomly initialized stand-ins with frozen
//! weights; plug in trained models via the `Classifier` trait for real
//! robustness numbers.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use robustez::prelude::*;

const NUM_MODELS: usize = 10;
const BATCH: usize = 64;
const CHANNELS: usize = 3;
const SIDE: usize = 8;
const FEATURES: usize = CHANNELS * SIDE * SIDE;
const HIDDEN: usize = 64;
const NUM_CLASSES: usize = 10;

/// Two-layer MLP over flattened image batches.
struct MlpClassifier {
    hidden: Linear,
    output: Linear,
}

impl MlpClassifier {
    fn new(seed: u64) -> Self {
        Self {
            hidden: Linear::with_seed(FEATURES, HIDDEN, Some(seed)),
            output: Linear::with_seed(HIDDEN, NUM_CLASSES, Some(seed.wrapping_add(1))),
        }
    }
}

impl Classifier for MlpClassifier {
    fn forward(&self, input: &Tensor) -> Tensor {
        let batch = input.shape()[0];
        let flat = input.view(&[batch, FEATURES]);
        self.output.forward(&self.hidden.forward(&flat).relu())
    }
}

/// A synthetic normalized image batch with random true labels.
fn synthetic_batch(
    rng: &mut StdRng,
    normalizer: &ChannelNormalizer,
) -> (Tensor, Vec<usize>) {
    let pixels: Vec<f32> = (0..BATCH * FEATURES)
        .map(|_| rng.random_range(0.0..1.0))
        .collect();
    let raw = Tensor::new(&pixels, &[BATCH, CHANNELS, SIDE, SIDE]);
    let labels: Vec<usize> = (0..BATCH).map(|_| rng.random_range(0..NUM_CLASSES)).collect();
    (normalizer.normalize(&raw), labels)
}

/// Permute the true labels to obtain attack targets.
fn permuted_targets(rng: &mut StdRng, labels: &[usize]) -> Tensor {
    let mut shuffled = labels.to_vec();
    shuffled.shuffle(rng);
    #[allow(clippy::cast_precision_loss)]
    let as_f32: Vec<f32> = shuffled.iter().map(|&l| l as f32).collect();
    Tensor::from_slice(&as_f32)
}

fn report(
    name: &str,
    ensemble: &Ensemble<&MlpClassifier>,
    adv_inputs: &Tensor,
    labels: &[usize],
) {
    let logits = no_grad(|| ensemble.forward(adv_inputs));
    let acc = accuracy(&argmax_rows(&logits), labels);
    println!("{name} ensemble: {acc:.4}");
}

fn main() -> robustez::Result<()> {
    let mut rng = StdRng::seed_from_u64(0);
    let normalizer = ChannelNormalizer::cifar10();

    println!("Building {NUM_MODELS} models for the standard and robust ensembles...");
    let models: Vec<MlpClassifier> = (0..NUM_MODELS)
        .map(|i| MlpClassifier::new(i as u64))
        .collect();

    let standard = Ensemble::new(models.iter().collect(), Aggregation::Mean)?;
    let robust = Ensemble::new(models.iter().collect(), Aggregation::CrossMax)?;

    let pgd = Pgd::new(0.5, 0.2, 100)?;

    println!("Generating adversarial examples against the robust ensemble...");
    let (inputs, labels) = synthetic_batch(&mut rng, &normalizer);
    let targets = permuted_targets(&mut rng, &labels);
    let delta = pgd.attack(&inputs, &targets, &robust, &normalizer)?;
    let adv_inputs = no_grad(|| inputs.add(&delta));
    println!("Accuracy on the first adversarial batch:");
    report("Robust", &robust, &adv_inputs, &labels);
    report("Standard", &standard, &adv_inputs, &labels);

    println!("Generating adversarial examples against the standard ensemble...");
    let (inputs, labels) = synthetic_batch(&mut rng, &normalizer);
    let targets = permuted_targets(&mut rng, &labels);
    let delta = pgd.attack(&inputs, &targets, &standard, &normalizer)?;
    let adv_inputs = no_grad(|| inputs.add(&delta));
    println!("Accuracy on the second adversarial batch:");
    report("Robust", &robust, &adv_inputs, &labels);
    report("Standard", &standard, &adv_inputs, &labels);

    Ok(())
}
