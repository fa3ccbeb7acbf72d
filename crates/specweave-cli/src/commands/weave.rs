//! `specweave weave`: Transform one class against a class path.

use crate::output::{StyledOutput, Tone};
use anyhow::{anyhow, Context};
use specweave_bytecode::ClassFile;
use specweave_engine::{ClassSource, DirectorySource, WeaveReport, Weaver, WeaverConfig};
use std::path::PathBuf;
use termcolor::ColorChoice;
use tracing::info;

/// Options of one `weave` invocation
pub struct WeaveArgs {
    pub class: String,
    pub class_path: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub color: ColorChoice,
}

pub fn execute(args: WeaveArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => WeaverConfig::from_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => WeaverConfig::default(),
    };
    let weaver = Weaver::new(config);
    let source = DirectorySource::with_roots(args.class_path);

    let bytes = source
        .load(&args.class)?
        .ok_or_else(|| anyhow!("class {} not found on the class path", args.class))?;
    let class = ClassFile::decode(&bytes).with_context(|| format!("cannot decode {}", args.class))?;
    let outcome = weaver.transform_class(&source, class)?;
    let report = outcome.report;

    if let Some(path) = &args.output {
        // Unchanged classes are written as read
        let encoded = if report.is_unchanged() {
            bytes
        } else {
            outcome.class.encode()
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, encoded).with_context(|| format!("cannot write {}", path.display()))?;
        info!(class = %report.class, path = %path.display(), "wrote class");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.color);
    }
    Ok(())
}

fn print_report(report: &WeaveReport, color: ColorChoice) {
    let mut out = StyledOutput::new(color);
    if report.is_unchanged() {
        out.tag("unchanged", Tone::Unchanged);
        match &report.skipped {
            Some(reason) => out.line(&format!(": {} ({})", report.class, reason)),
            None => out.line(&format!(": {}", report.class)),
        }
        out.flush();
        return;
    }

    out.tag("woven", Tone::Changed);
    out.line(&format!(": {}", report.class));
    for method in &report.woven_methods {
        out.tag("  body     ", Tone::Detail);
        out.line(method);
    }
    for wrapper in &report.wrappers {
        out.tag("  wrapper  ", Tone::Detail);
        out.line(wrapper);
    }
    out.line(&format!("  {} call site(s) rewritten", report.rewritten_calls));
    out.flush();
}
