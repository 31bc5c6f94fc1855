use crate::app::{cli::ansi, config::Config};
use base::{
    error::{RuntimeError, SpecFitError},
    progress::LogProgress,
    utils::iso_timestamp_short,
};
use decomp::{
    io::load_basis,
    synthetic::{demo_basis, random_mix, CaptureOptions, SyntheticCapture},
    MaterialBasis, SpecularFitProcess, SpecularFitReport,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[clap(about = "Render a synthetic capture from known materials and decompose it.")]
pub struct SynthOptions {
    #[clap(long, default_value_t = 16, help = "Number of rendered views")]
    pub views: usize,

    #[clap(
        long,
        default_value_t = 0.8,
        help = "Probability for a texel to be visible in a view"
    )]
    pub visibility: f64,

    #[clap(long, default_value_t = 1.0, help = "Upper bound of the normalised halfway angle")]
    pub max_halfway: f64,

    #[clap(
        long,
        default_value_t = 0.0,
        help = "Fraction of texels mixing several materials instead of a\nsingle one"
    )]
    pub mix: f64,

    #[clap(long, default_value_t = 0, help = "Seed of the synthetic capture")]
    pub seed: u64,

    #[clap(
        long,
        help = "Fit only the weights against the basis saved in this\ndirectory"
    )]
    pub from_basis: Option<PathBuf>,

    #[clap(short, long, help = "Output directory [default: ./specfit-output]")]
    pub output: Option<PathBuf>,

    #[clap(long, help = "Do not save the fitted basis and weights")]
    pub no_save: bool,
}

impl SynthOptions {
    /// Checks that the probabilities and the halfway bound are usable.
    fn validate(&self) -> Result<(), SpecFitError> {
        let checks = [
            ("visibility", self.visibility, 0.0..=1.0),
            ("mix", self.mix, 0.0..=1.0),
            ("max-halfway", self.max_halfway, f64::EPSILON..=1.0),
        ];
        match checks.into_iter().find(|(_, value, range)| !range.contains(value)) {
            Some((name, value, range)) => Err(SpecFitError::from_runtime_error(
                RuntimeError::InvalidSettings(format!(
                    "--{} must lie in [{}, {}], got {}",
                    name,
                    range.start(),
                    range.end(),
                    value
                )),
                "Invalid synthetic capture options",
            )),
            None => Ok(()),
        }
    }
}

pub fn synth(opts: SynthOptions, config: Config) -> Result<(), SpecFitError> {
    opts.validate()?;
    let settings = config.settings().clone();
    let process = SpecularFitProcess::new(settings.clone())?;

    let truth_basis = demo_basis(
        settings.basis.basis_count,
        settings.basis.basis_resolution,
        settings.basis.metallicity,
    );
    let mut capture = SyntheticCapture::striped(settings.texture, truth_basis, settings.basis.metallicity);
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    for p in 0..settings.texture.texel_count() {
        if opts.mix > 0.0 && rng.gen_bool(opts.mix) {
            let weights = random_mix(settings.basis.basis_count, &mut rng);
            capture.set_weights(p, &weights);
        }
    }
    let views = capture.render(&CaptureOptions {
        view_count: opts.views,
        visibility: opts.visibility,
        max_halfway: opts.max_halfway,
        seed: opts.seed,
        ..Default::default()
    });
    log::info!(
        "Rendered {} synthetic views of {}x{} texels.",
        views.len(),
        settings.texture.width,
        settings.texture.height
    );

    let report = match &opts.from_basis {
        Some(dir) => {
            let basis = load_basis(&base::utils::resolve_path(config.cwd(), Some(dir)))?;
            process.optimize_from_existing_basis(&views, &basis, &LogProgress)?
        },
        None => process.optimize_from_scratch(&views, &LogProgress)?,
    };
    print_summary(&report, &capture);

    if !opts.no_save {
        let dir = config
            .output_dir(opts.output.as_deref())
            .join(iso_timestamp_short(chrono::Local::now()));
        report.decomposition.save(&dir)?;
        capture.basis().save(&dir.join("ground-truth"))?;
        settings.save(&dir.join(crate::app::config::SETTINGS_FILE_NAME))?;
        println!("{} Results saved to {}", ansi::CYAN_CHECK, dir.display());
    }
    Ok(())
}

fn print_summary(report: &SpecularFitReport, capture: &SyntheticCapture) {
    let decomposition = &report.decomposition;
    println!(
        "{}Specular fit finished after {} iteration(s){}",
        ansi::BRIGHT_CYAN,
        report.iterations,
        ansi::RESET
    );
    for (i, error) in report.error_history.iter().enumerate() {
        println!(
            "  {} iteration {}: RMSE {:.6} over {} samples",
            ansi::CYAN_MINUS,
            i + 1,
            error.rmse,
            error.sample_count
        );
    }
    println!(
        "  {} {} texels filled in {} pass(es); {} of {} texels valid",
        ansi::CYAN_MINUS,
        report.hole_fill.filled,
        report.hole_fill.passes,
        decomposition.valid_count(),
        decomposition.texel_count()
    );

    let fitted = decomposition.material_basis();
    let truth = capture.basis();
    println!("{}Diffuse albedo (fitted / ground truth){}", ansi::BRIGHT_CYAN, ansi::RESET);
    for b in 0..fitted.material_count().max(truth.material_count()) {
        let show = |basis: &dyn MaterialBasis| {
            if b < basis.material_count() {
                let c = basis.diffuse_color(b);
                format!("{:.4} {:.4} {:.4}", c.x, c.y, c.z)
            } else {
                String::from("-")
            }
        };
        println!(
            "  {}#{}{} {} / {}",
            ansi::BRIGHT_YELLOW,
            b,
            ansi::RESET,
            show(fitted),
            show(truth)
        );
    }
}
