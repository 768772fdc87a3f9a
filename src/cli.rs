//! Command line front end: generate | schema | check
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::app_def::AppDefinition;
use crate::codegen::{GeneratedOutput, GeneratorOptions, TargetKind, generate};
use crate::context::Warning;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate typed RPC clients from an application definition
#[derive(Parser, Debug)]
#[command(name = "rpcgen", version)]
pub struct CommandLineInterface {
    /// more logging (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// emit one client source file per target
    Generate(GenerateOut),
    /// print the normalized application definition
    Schema(SchemaOut),
    /// load and lower every target in memory, print warnings, write nothing
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// application definition (JSON)
    #[arg(long, short)]
    input: PathBuf,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// name of the root client type
    #[arg(long, default_value = "Client")]
    client_name: String,

    /// prepended to every model type name
    #[arg(long, default_value = "")]
    type_prefix: String,

    /// overrides `info.version` from the definition
    #[arg(long)]
    client_version: Option<String>,

    /// `typescript=path/to/client.ts`, `rust=src/client.rs`, or a bare
    /// language to print to stdout; repeatable
    #[arg(long = "target", short, required = true, value_parser = TargetSpec::from_str)]
    targets: Vec<TargetSpec>,

    /// run prettier / rustfmt on written files
    #[arg(long)]
    format: bool,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct CheckArgs {
    #[command(flatten)]
    input_settings: InputSettings,

    /// name used for the root client type while lowering
    #[arg(long, default_value = "Client")]
    client_name: String,
}

/// One `--target` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub kind: TargetKind,
    /// stdout when absent
    pub out: Option<PathBuf>,
}

impl FromStr for TargetSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((kind, path)) if !path.is_empty() => Ok(Self {
                kind: kind.parse()?,
                out: Some(PathBuf::from(path)),
            }),
            Some((kind, _)) => Err(format!("missing output path after \"{kind}=\"")),
            None => Ok(Self {
                kind: s.parse()?,
                out: None,
            }),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<AppDefinition> {
        crate::load::read_app_definition(&self.input)
            .with_context(|| format!("failed to load application definition {}", self.input.display()))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Generate(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }
                target.run()
            }
            Command::Schema(target) => {
                let app = target.input_settings.load()?;
                let schema_src = serde_json::to_string_pretty(&app.to_json())?;
                match target.out.as_ref() {
                    Some(out) => crate::output::write_output(out, &schema_src, None)?,
                    None => println!("{schema_src}"),
                }
                Ok(())
            }
            Command::Check(target) => {
                let app = target.input_settings.load()?;
                let options = GeneratorOptions {
                    client_name: target.client_name.clone(),
                    ..GeneratorOptions::default()
                };
                let mut total = 0;
                for kind in [TargetKind::TypeScript, TargetKind::Rust] {
                    let output = generate(&app, kind, &options)
                        .with_context(|| format!("failed to lower the {kind} client"))?;
                    total += output.warnings.len();
                    print_warnings(kind, &output.warnings);
                }
                if total == 0 {
                    eprintln!("{} {}", "ok".green().bold(), target.input_settings.input.display());
                }
                Ok(())
            }
        }
    }
}

impl GenerateOut {
    fn run(&self) -> Result<()> {
        let app = self.input_settings.load()?;
        let options = GeneratorOptions {
            client_name: self.client_name.clone(),
            type_prefix: self.type_prefix.clone(),
            client_version: self.client_version.clone(),
            format: self.format,
        };

        // runs share nothing, so every target renders on its own thread
        let results = self
            .targets
            .par_iter()
            .map(|spec| -> Result<(&TargetSpec, GeneratedOutput)> {
                let output = generate(&app, spec.kind, &options)
                    .with_context(|| format!("failed to generate the {} client", spec.kind))?;
                if let Some(out) = spec.out.as_ref() {
                    let formatter = options.format.then(|| spec.kind.formatter());
                    crate::output::write_output(out, &output.source, formatter)?;
                }
                Ok((spec, output))
            })
            .collect::<Vec<_>>();

        for result in results {
            let (spec, output) = result?;
            print_warnings(spec.kind, &output.warnings);
            match spec.out.as_ref() {
                Some(out) => eprintln!("{} {} client → {}", "wrote".green().bold(), spec.kind, out.display()),
                None => println!("{}", output.source),
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn print_warnings(kind: TargetKind, warnings: &[Warning]) {
    for warning in warnings {
        eprintln!(
            "{} [{}] {}: {}",
            "warning".yellow().bold(),
            kind,
            warning.path.dimmed(),
            warning.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_specs_parse() {
        assert_eq!(
            "ts=out/client.ts".parse::<TargetSpec>().unwrap(),
            TargetSpec {
                kind: TargetKind::TypeScript,
                out: Some(PathBuf::from("out/client.ts")),
            }
        );
        assert_eq!(
            "rust".parse::<TargetSpec>().unwrap(),
            TargetSpec {
                kind: TargetKind::Rust,
                out: None,
            }
        );
        assert!("rust=".parse::<TargetSpec>().is_err());
        assert!("kotlin=client.kt".parse::<TargetSpec>().is_err());
    }

    #[test]
    fn generate_arguments_parse() {
        let cli = CommandLineInterface::try_parse_from([
            "rpcgen",
            "-vv",
            "generate",
            "--input",
            "app.json",
            "--client-name",
            "ExampleClient",
            "--target",
            "typescript=client.ts",
            "--target",
            "rust",
            "--format",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Generate(generate) = cli.cmd else {
            panic!("expected generate");
        };
        assert_eq!(generate.client_name, "ExampleClient");
        assert_eq!(generate.targets.len(), 2);
        assert!(generate.format);
    }

    #[test]
    fn generate_requires_a_target() {
        let result = CommandLineInterface::try_parse_from(["rpcgen", "generate", "--input", "app.json"]);
        assert!(result.is_err());
    }
}
