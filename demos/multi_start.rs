// Multi-start REINFORCE on a toy start-node problem.
//
// Each instance has NODES points; node i lies within (i + 1) / NODES of the
// origin. A start picks one node and is rewarded with minus its distance, so
// the policy (one logit per node) should learn to prefer node 0. Every
// instance is tiled `instance_repeats` times, the starts are regrouped per
// instance, and each start is compared against its instance's mean reward.
//
//   cargo run --example multi_start -- --config_yaml demos/config.yaml

use anyhow::anyhow;
use burn::{
    backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    },
    module::Param,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};
use clap::Parser;
use log::info;
use multistart::prelude::*;
use rand::distributions::{Distribution as _, WeightedIndex};

type DemoBackend = Autodiff<NdArray>;

const NODES: usize = 10;

/// One logit per node, shared by every instance.
#[derive(Module, Debug)]
struct StartPolicy<B: Backend> {
    logits: Param<Tensor<B, 1>>,
}

impl<B: Backend> StartPolicy<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            logits: Param::from_tensor(Tensor::zeros([NODES], device)),
        }
    }

    fn probs(&self) -> anyhow::Result<Vec<f32>> {
        softmax(self.logits.val(), 0)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("{e:?}"))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let RunContext { config, mut rng } = RunContext::prepare(&cli)?;

    if config.mode() == Mode::Test {
        info!("The demo has no checkpoint to evaluate, nothing to do");
        return Ok(());
    }

    let device = NdArrayDevice::default();
    let starts = config.repeat_spec();
    let clipper = config.clipper();
    let learning_rate = config
        .extra
        .get("learning_rate")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.05);

    let scale = Tensor::<DemoBackend, 1>::from_data(
        TensorData::new(
            (1..=NODES).map(|i| i as f32 / NODES as f32).collect::<Vec<_>>(),
            [NODES],
        ),
        &device,
    )
    .reshape([1, NODES, 1]);

    let mut policy = StartPolicy::<DemoBackend>::new(&device);
    let mut optimizer = AdamWConfig::new().init();

    let mut timer = TimeEstimator::new();
    timer.reset(1);

    for epoch in 1..=config.epochs {
        let locs = Tensor::<DemoBackend, 3>::random(
            [config.batch_size, NODES, 2],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        ) * scale.clone();
        let state = TensorDict::new(config.batch_size).with("locs", locs)?;
        let state = batchify(state, starts.clone())?;
        let n = state.batch_size();

        // one start node per trajectory, in replicated layout
        let sampler = WeightedIndex::new(policy.probs()?)?;
        let picks: Vec<i64> = (0..n).map(|_| sampler.sample(&mut rng) as i64).collect();
        let picks = Tensor::<DemoBackend, 1, Int>::from_data(TensorData::new(picks, [n]), &device);

        let locs: Tensor<DemoBackend, 3> = state
            .float("locs")
            .ok_or_else(|| anyhow!("state lost its `locs` field"))?;
        let reward = locs
            .powf_scalar(2.0)
            .sum_dim(2)
            .sqrt()
            .squeeze::<2>(2)
            .gather(1, picks.clone().reshape([n, 1]))
            .squeeze::<1>(1)
            .neg();
        let log_likelihood = log_softmax(policy.logits.val(), 0).select(0, picks);

        // [batch * starts] -> [batch, starts]
        let reward: Tensor<DemoBackend, 2> = unbatchify(reward, starts.clone())?;
        let log_likelihood: Tensor<DemoBackend, 2> = unbatchify(log_likelihood, starts.clone())?;
        let advantage = reward.clone() - reward.clone().mean_dim(1);
        let best = reward.max_dim(1).mean().into_scalar();

        let loss = (advantage.detach() * log_likelihood).mean().neg();
        let mut grads = GradientsParams::from_grads(loss.backward(), &policy);

        let mut groups = vec![ParamGroup::from_module("policy", &policy, &grads)?];
        let norms = clipper.clip(&mut groups)?;
        groups[0].register_grads(&mut grads);
        policy = optimizer.step(learning_rate, policy, grads);

        info!(
            "Epoch {epoch:3}: best-of-starts reward {best:.4}, grad norm {:.4} -> {:.4}, p(node 0) {:.3}",
            norms.pre_clip[0],
            norms.post_clip[0],
            policy.probs()?[0]
        );
        timer.log_progress(epoch as i64, config.epochs as i64);
    }

    Ok(())
}
