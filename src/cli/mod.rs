//! EV-016: CLI subcommands.

use crate::core::error::{ConfigError, Error};
use crate::core::types::{BuildRequest, EntitySchema, SchemaCache};
use crate::core::{cache, keys, lookup, parser, rebuild, resolver};
use crate::loader;
use crate::watch::{Cycle, Watcher};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter electro-viewer.yaml into the project root
    Init,

    /// Validate electro-viewer.yaml without loading any entity files
    Validate,

    /// Load entity modules and write the schema cache
    Build,

    /// List entities in the schema cache
    Entities {
        /// Print the full entity schemas as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render the partition and sort keys for one index
    Key {
        /// Entity name
        entity: String,

        /// Index (access pattern) name
        index: String,

        /// Composite attribute value, repeatable
        #[arg(short = 'v', long = "value", value_name = "ATTR=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },

    /// Show the storage lookup plan for one index
    Lookup {
        /// Entity name
        entity: String,

        /// Index (access pattern) name
        index: String,

        /// Partition-key composite value, repeatable
        #[arg(long = "pk", value_name = "ATTR=VALUE", value_parser = parse_assignment)]
        pk: Vec<(String, String)>,

        /// Sort-key composite value, repeatable
        #[arg(long = "sk", value_name = "ATTR=VALUE", value_parser = parse_assignment)]
        sk: Vec<(String, String)>,
    },

    /// Add entity markers and every index key to a JSON item
    Item {
        /// Entity name
        entity: String,

        /// JSON object file ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        file: PathBuf,
    },

    /// Check the schema cache structure
    Verify,

    /// Rebuild the schema cache whenever entity files change
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

/// Dispatch a CLI command against the project at `root`.
pub fn dispatch(cmd: Commands, root: &Path) -> Result<(), Error> {
    match cmd {
        Commands::Init => cmd_init(root),
        Commands::Validate => cmd_validate(root),
        Commands::Build => cmd_build(root),
        Commands::Entities { json } => cmd_entities(root, json),
        Commands::Key {
            entity,
            index,
            values,
        } => cmd_key(root, &entity, &index, &values),
        Commands::Lookup { entity, index, pk, sk } => cmd_lookup(root, &entity, &index, &pk, &sk),
        Commands::Item { entity, file } => cmd_item(root, &entity, &file),
        Commands::Verify => cmd_verify(root),
        Commands::Watch { interval_ms } => cmd_watch(root, Duration::from_millis(interval_ms)),
    }
}

/// Parse `ATTR=VALUE`. The value may be empty or contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected ATTR=VALUE, got '{}'", s)),
    }
}

fn cmd_init(root: &Path) -> Result<(), Error> {
    let config_path = parser::config_path(root);
    if config_path.exists() {
        return Err(ConfigError::AlreadyExists(config_path).into());
    }
    std::fs::create_dir_all(root)?;
    std::fs::write(&config_path, parser::starter_config())?;

    println!("Initialized electro-viewer project at {}", root.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(root: &Path) -> Result<(), Error> {
    let config = parser::parse_config_file(&parser::config_path(root))?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} pattern(s), loader {}",
            config.entities.len(),
            config.loader.kind
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(ConfigError::Invalid {
            count: errors.len(),
        }
        .into())
    }
}

fn project_rebuilder(root: &Path) -> Result<rebuild::Rebuilder, Error> {
    let config = parser::load_project(root)?;
    let request = BuildRequest::from_config(root, &config);
    Ok(rebuild::Rebuilder::new(request, loader::from_config(&config.loader)))
}

fn cmd_build(root: &Path) -> Result<(), Error> {
    let config = parser::load_project(root)?;
    let request = BuildRequest::from_config(root, &config);
    let loader = loader::from_config(&config.loader);
    let (path, schema) = cache::build_and_write(&request, loader.as_ref())?;

    print_warnings(&schema);
    println!(
        "Built {} entit{} -> {}",
        schema.entities.len(),
        if schema.entities.len() == 1 { "y" } else { "ies" },
        path.display()
    );
    Ok(())
}

fn print_warnings(schema: &SchemaCache) {
    for w in &schema.warnings {
        println!("  warning: {}", w);
    }
    for entity in &schema.entities {
        for w in &entity.warnings {
            println!("  warning: {}: {}", entity.name, w);
        }
    }
}

fn load_cache(root: &Path) -> Result<SchemaCache, Error> {
    Ok(cache::load(&resolver::absolute_root(root))?)
}

fn find_entity<'a>(schema: &'a SchemaCache, name: &str) -> Result<&'a EntitySchema, Error> {
    schema.entity(name).ok_or_else(|| {
        Error::Lookup(format!(
            "entity '{}' not found in schema cache (available: {})",
            name,
            schema
                .entities
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

fn cmd_entities(root: &Path, json: bool) -> Result<(), Error> {
    let schema = load_cache(root)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&schema.entities)?);
        return Ok(());
    }

    println!("Schema cache generated {}", schema.generated_at);
    for entity in &schema.entities {
        let primary = entity.primary_index().map(|(name, _)| name).unwrap_or("?");
        println!(
            "  {} v{} (service {}): {} index(es), primary {}, {}",
            entity.name,
            entity.version,
            entity.service,
            entity.indexes.len(),
            primary,
            entity.source_file
        );
    }
    print_warnings(&schema);
    Ok(())
}

/// Rendered (field, key) pairs for one index.
pub fn render_keys(
    entity: &EntitySchema,
    index: &str,
    values: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, Error> {
    let def = entity
        .indexes
        .get(index)
        .ok_or_else(|| Error::Lookup(format!("index '{}' not found on entity '{}'", index, entity.name)))?;
    let identity = entity.identity();
    let mut rendered = vec![(
        def.pk.field.clone(),
        keys::partition_key(&def.pk.composite, values, &identity),
    )];
    if let Some(sk) = &def.sk {
        rendered.push((sk.field.clone(), keys::sort_key(&sk.composite, values, &identity)));
    }
    Ok(rendered)
}

fn cmd_key(root: &Path, entity: &str, index: &str, values: &[(String, String)]) -> Result<(), Error> {
    let schema = load_cache(root)?;
    let entity = find_entity(&schema, entity)?;
    let values: BTreeMap<String, String> = values.iter().cloned().collect();

    for (field, key) in render_keys(entity, index, &values)? {
        println!("{}: {}", field, key);
    }
    let missing = lookup::missing_key_attributes(entity, index, &values)?;
    if !missing.is_empty() {
        println!("  (no value for: {})", missing.join(", "));
    }
    Ok(())
}

fn cmd_lookup(
    root: &Path,
    entity: &str,
    index: &str,
    pk: &[(String, String)],
    sk: &[(String, String)],
) -> Result<(), Error> {
    let schema = load_cache(root)?;
    let entity = find_entity(&schema, entity)?;
    let pk: BTreeMap<String, String> = pk.iter().cloned().collect();
    let sk: BTreeMap<String, String> = sk.iter().cloned().collect();

    let plan = lookup::plan_lookup(entity, index, &pk, &sk)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&plan)?
    );
    Ok(())
}

fn read_item(file: &Path) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
    let content = if file == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(file)?
    };
    match serde_json::from_str(&content) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Lookup("item must be a JSON object".to_string())),
        Err(e) => Err(Error::Lookup(format!("item is not valid JSON: {}", e))),
    }
}

fn cmd_item(root: &Path, entity: &str, file: &Path) -> Result<(), Error> {
    let schema = load_cache(root)?;
    let entity = find_entity(&schema, entity)?;
    let item = read_item(file)?;
    let prepared = lookup::prepare_item(entity, &item)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&prepared)?
    );
    Ok(())
}

fn cmd_verify(root: &Path) -> Result<(), Error> {
    let root = resolver::absolute_root(root);
    let schema = cache::load_validated(&root)?;
    println!(
        "OK: {} ({} entities, generated {})",
        cache::cache_path(&root).display(),
        schema.entities.len(),
        schema.generated_at
    );
    Ok(())
}

fn report_cycle(cycle: &Cycle) {
    for change in &cycle.changes {
        println!("  {} {}", change.kind, change.path.display());
    }
    match &cycle.outcome {
        rebuild::RebuildOutcome::Rebuilt { path, entities } => {
            println!("Rebuilt {} entities -> {}", entities, path.display())
        }
        rebuild::RebuildOutcome::Skipped => println!("Rebuild already running; skipped"),
        rebuild::RebuildOutcome::Failed(e) => eprintln!("Rebuild failed: {}", e),
    }
}

fn cmd_watch(root: &Path, interval: Duration) -> Result<(), Error> {
    let rebuilder = project_rebuilder(root)?;
    match rebuilder.trigger() {
        rebuild::RebuildOutcome::Rebuilt { path, entities } => {
            println!("Built {} entities -> {}", entities, path.display())
        }
        rebuild::RebuildOutcome::Failed(e) => eprintln!("Initial build failed: {}", e),
        rebuild::RebuildOutcome::Skipped => {}
    }

    let mut watcher = Watcher::new(rebuilder, interval);
    println!("Watching {} for entity changes (Ctrl-C to stop)", root.display());
    watcher.run(|| false, report_cycle);
    Ok(())
}
