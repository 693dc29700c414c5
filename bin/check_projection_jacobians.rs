//! Projection Factor Jacobian Check
//!
//! Draws random two-frame scenes, evaluates the analytic Jacobians of the
//! projection factor and compares them with central finite differences on the
//! parameter tangent spaces.
//!
//! # Usage
//! ```bash
//! cargo run --release --bin check_projection_jacobians
//!
//! # Unit-sphere residual on a rotating mount, 500 scenes:
//! cargo run --release --bin check_projection_jacobians -- --model unit-sphere --mount rotating -n 500
//! ```
//!
//! Exits with an error if any block exceeds the relative tolerance.

use apex_vio::factors::numerical::{DEFAULT_STEP, compare_jacobians, numeric_jacobians};
use apex_vio::factors::{Factor, linearize_batch};
use apex_vio::init_logger;
use apex_vio::synthetic::SyntheticScene;
use apex_vio::{JacobianRequest, ProjectionConfig, ProjectionFactor, ResidualModelType};
use clap::{Parser, ValueEnum};
use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;
use std::time::Instant;
use tracing::{info, warn};

/// Residual formulation
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ModelArg {
    /// Normalized image plane
    #[default]
    Pinhole,
    /// Unit-sphere tangent plane
    UnitSphere,
}

impl From<ModelArg> for ResidualModelType {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Pinhole => ResidualModelType::Pinhole,
            ModelArg::UnitSphere => ResidualModelType::UnitSphere,
        }
    }
}

/// Camera mount motion
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum MountArg {
    /// Camera rigidly attached to the body
    Static,
    /// Camera on an encoder-driven rotating mount
    #[default]
    Rotating,
}

#[derive(Parser)]
#[command(name = "check_projection_jacobians")]
#[command(about = "Compare analytic projection factor Jacobians with finite differences")]
struct Args {
    /// Residual model
    #[arg(short = 'm', long, value_enum, default_value = "pinhole")]
    model: ModelArg,

    /// Mount motion
    #[arg(long, value_enum, default_value = "rotating")]
    mount: MountArg,

    /// Number of random scenes
    #[arg(short = 'n', long, default_value_t = 100)]
    scenes: usize,

    /// Random seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Finite-difference step
    #[arg(long, default_value_t = DEFAULT_STEP)]
    step: f64,

    /// Maximum accepted relative error per block
    #[arg(short, long, default_value_t = 1e-5)]
    tolerance: f64,

    /// Observation offset on the normalized plane (non-zero residuals)
    #[arg(long, default_value_t = 0.01)]
    offset: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logger();

    info!("APEX-VIO PROJECTION JACOBIAN CHECK");
    info!("  Model: {:?}", args.model);
    info!("  Mount: {:?}", args.mount);
    info!("  Scenes: {}", args.scenes);
    info!("  Step: {:e}", args.step);
    info!("  Tolerance: {:e}", args.tolerance);

    let base = ProjectionConfig::new().with_residual_model(args.model.into());
    let rotating = matches!(args.mount, MountArg::Rotating);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut factors: Vec<ProjectionFactor> = Vec::with_capacity(args.scenes);
    let mut params: Vec<Vec<DVector<f64>>> = Vec::with_capacity(args.scenes);
    let mut worst_relative = 0.0_f64;
    let mut failures = 0usize;

    for index in 0..args.scenes {
        let scene = SyntheticScene::random(&mut rng, rotating)?
            .with_observation_offset(args.offset, -0.5 * args.offset);
        let config = scene.config(&base);
        let factor = scene.factor(&config)?;

        let analytic = factor
            .evaluate(&scene.params, JacobianRequest::all())?
            .jacobians;
        let numeric = numeric_jacobians(&factor, &scene.params, JacobianRequest::all(), args.step)?;

        for error in compare_jacobians(&analytic, &numeric) {
            worst_relative = worst_relative.max(error.relative);
            if error.relative > args.tolerance {
                failures += 1;
                warn!(
                    "scene {}: {} max abs {:.3e}, relative {:.3e}",
                    index, error.block, error.max_abs, error.relative
                );
            }
        }

        params.push(vec![
            scene.params.pose_i.into(),
            scene.params.pose_j.into(),
            scene.params.extrinsic.into(),
            DVector::from_element(1, scene.params.inverse_depth),
        ]);
        factors.push(factor);
    }

    let start = Instant::now();
    let linearized = linearize_batch(&factors, &params, true)?;
    let batch_time = start.elapsed();
    let total_cost: f64 = linearized
        .iter()
        .map(|(residual, _)| 0.5 * residual.norm_squared())
        .sum();

    info!("");
    info!("Results:");
    info!("  Worst relative error: {:.3e}", worst_relative);
    info!("  Blocks over tolerance: {}", failures);
    info!(
        "  Batch linearization: {} factors x {} rows in {:?}",
        linearized.len(),
        factors.first().map_or(0, |f| f.get_dimension()),
        batch_time
    );
    info!("  Total cost at offset observations: {:.6e}", total_cost);
    info!("{}", base.stats);

    if failures > 0 {
        return Err(format!("{failures} Jacobian blocks exceeded tolerance").into());
    }
    Ok(())
}
