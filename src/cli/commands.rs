use crate::{
    cli::args::{ExpandArgs, FoldArgs, ResolveArgs, StubsArgs, UnfoldArgs},
    core::{
        snapshot::{load_pipelines, load_tree},
        stub::variant_keys,
        transformer::{expand_tests, unfold as unfold_tree},
        ApiflowsConfig, ConfigLoader, ConfigValidator, GenerationOutput, SnapshotWriter, StubData,
    },
    utils::serialization::{Serializer, YamlSerializer},
    Result,
};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of resolving one outbound call, printed as YAML.
#[derive(Debug, Serialize)]
struct ResolveReport {
    service: String,
    path: String,
    pattern: Option<String>,
    variants: Vec<String>,
}

fn workspace_root(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path.to_path_buf()),
        None => env::current_dir().context("failed to resolve current directory"),
    }
}

fn load_config(workspace: Option<&Path>) -> Result<ApiflowsConfig> {
    let root = workspace_root(workspace)?;
    let config = ConfigLoader::load_from_workspace(&root)?;
    ConfigValidator::validate(&config)?;
    tracing::debug!(workspace = %root.display(), "configuration loaded");
    Ok(config)
}

fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let content = YamlSerializer.serialize(data)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(())
}

pub async fn stubs(args: StubsArgs) -> Result<()> {
    let data = StubData::load(&args.stub_file)?;
    tracing::info!(
        stub_file = %args.stub_file.display(),
        services = data.services().count(),
        "stub file loaded"
    );
    print!("{}", data.to_yaml_string()?);
    Ok(())
}

pub async fn resolve(args: ResolveArgs) -> Result<()> {
    let config = load_config(args.workspace.as_deref())?;
    let data = StubData::load(&args.stub_file)?;

    let (service, path) = config
        .externals
        .lookup(&args.url)
        .ok_or_else(|| anyhow!("{} does not belong to a configured external service", args.url))?;
    let method = args.method.to_lowercase();
    let resolution = data.resolve(&service, &path, Some(&method));
    if resolution.pattern.is_none() {
        tracing::warn!(service, path, "no stored template matches the call");
    }

    let report = ResolveReport {
        variants: resolution
            .variants
            .map(|variants| {
                variant_keys(variants)
                    .into_iter()
                    .map(|key| key.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        pattern: resolution.pattern,
        service,
        path,
    };
    print_yaml(&report)
}

pub async fn fold(args: FoldArgs) -> Result<()> {
    let config = load_config(args.workspace.as_deref())?;
    let pipelines = load_pipelines(&args.input)?;
    let repeated = args
        .repeated
        .as_deref()
        .map(load_pipelines)
        .transpose()?;
    let data_used = match &args.stubs {
        Some(path) => StubData::load(path)?,
        None => StubData::default(),
    };

    let options = config.normalizer.options()?;
    let fold_tree = config.generator.fold && !args.flat;
    let output = GenerationOutput::build(
        pipelines,
        repeated.as_ref(),
        &options,
        fold_tree,
        data_used,
    );

    let writer = SnapshotWriter::new(&args.output_dir, &args.feature);
    let files = writer.write(&output)?;
    println!("Snapshot written to {}", files.snapshot.display());
    println!(
        "{} tests, {} distinct points",
        output.pipelines.len(),
        output.registry.len()
    );
    Ok(())
}

pub async fn unfold(args: UnfoldArgs) -> Result<()> {
    let tree = load_tree(&args.snapshot)?;
    let pipelines = unfold_tree(&tree);
    tracing::debug!(tests = pipelines.len(), "snapshot unfolded");
    print_yaml(&pipelines)
}

pub async fn expand(args: ExpandArgs) -> Result<()> {
    let config = load_config(args.workspace.as_deref())?;
    let tree = load_tree(&args.snapshot)?;

    let mut options = config.replay.expand_options();
    options.filter_used_asserts = args.filter_used_asserts;
    options.filter_used_subflows = args.filter_used_subflows;
    options.context_set_up = args.context_set_up;

    let tests = expand_tests(&tree, &options);
    for test in &tests {
        test.build()
            .with_context(|| format!("flow {} does not form a workflow", test.flow.join("/")))?;
        println!("{}", test.display_name());
    }
    tracing::info!(tests = tests.len(), "snapshot expanded");
    Ok(())
}
