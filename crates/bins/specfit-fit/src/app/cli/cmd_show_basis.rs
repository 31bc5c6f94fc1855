use crate::app::{cli::ansi, config::Config};
use base::{error::SpecFitError, Channel};
use decomp::{io::load_basis, MaterialBasis};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[clap(about = "Print a saved material basis.")]
pub struct ShowBasisOptions {
    #[clap(help = "Directory holding basisFunctions.csv")]
    pub dir: PathBuf,

    #[clap(long, value_enum, help = "Only print the specular curves of this channel")]
    pub channel: Option<Channel>,
}

pub fn show_basis(opts: ShowBasisOptions, config: Config) -> Result<(), SpecFitError> {
    let dir = base::utils::resolve_path(config.cwd(), Some(&opts.dir));
    let basis = load_basis(&dir)?;
    let channels = match opts.channel {
        Some(channel) => vec![channel],
        None => Channel::ALL.to_vec(),
    };

    println!(
        "{}{} basis functions, resolution {}{}",
        ansi::BRIGHT_CYAN,
        basis.material_count(),
        basis.specular_resolution(),
        ansi::RESET
    );
    for b in 0..basis.material_count() {
        let diffuse = basis.diffuse_color(b);
        println!(
            "{}#{}{} diffuse albedo: {:.4} {:.4} {:.4}",
            ansi::BRIGHT_YELLOW,
            b,
            ansi::RESET,
            diffuse.x,
            diffuse.y,
            diffuse.z
        );
        for channel in &channels {
            let curve = basis
                .specular_curve(*channel, b)
                .iter()
                .map(|v| format!("{:.4}", v))
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {} {:5}: {}", ansi::CYAN_MINUS, channel.name(), curve);
        }
    }
    Ok(())
}
