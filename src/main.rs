//! lifegraph command line

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use lifegraph::aggregation::{reduce, LevelKey};
use lifegraph::{EntityId, Graph, LeafKind, Lifegraph, PropertyValue, ValueType};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Schema-governed local property graph
#[derive(Parser, Debug)]
#[command(name = "lifegraph")]
#[command(version, about, long_about = None)]
struct Args {
    /// Data directory holding schema.json, schema.log and graph/
    #[arg(short, long, global = true, env = "LIFEGRAPH_DATA", default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Declare a new entity type
    CreateType { name: String },
    /// Add a property to a type and its descendants
    AddProperty {
        type_name: String,
        property: String,
        /// Leaf type (string, integer, date) or a declared type
        value_type: String,
    },
    /// Change the value type of a property
    EditProperty {
        type_name: String,
        property: String,
        value_type: String,
    },
    /// Remove a property from a type and its descendants
    RemoveProperty { type_name: String, property: String },
    /// Give a parentless type a parent
    MakeParent { parent: String, child: String },
    /// Replace the parent of a type
    EditParent { child: String, parent: String },
    /// Detach a type from its parent
    RemoveParent { child: String },
    /// Print a type definition and its effective properties
    ShowType { name: String },
    /// Create an entity with every property unknown
    Create { type_name: String },
    /// Duplicate an entity
    Copy { id: String },
    /// Duplicate an entity, keeping only values shared by all its peers
    SmartCopy { id: String },
    /// Set a property; "null" clears it to unknown
    Set {
        id: String,
        property: String,
        value: String,
    },
    /// Report schema drift in the stored graph
    Audit,
    /// Find entities by fuzzy string match
    Search {
        query: String,
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
    },
    /// List the generalization levels reachable from all entities of a type
    Levels { type_name: String },
    /// Group entities of a type by generalization levels and reduce a property
    Aggregate {
        type_name: String,
        property: String,
        /// Level as depth:pointing_property:type, repeatable
        #[arg(short, long = "level", required = true)]
        levels: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = Reduction::Mean)]
        function: Reduction,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Reduction {
    Mean,
    Sum,
    Count,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut lg = Lifegraph::open_dir(&args.data)?;
    let graph = lg.graph_mut();

    match args.command {
        Command::CreateType { name } => graph.schema_mut().create_type(&name)?,
        Command::AddProperty { type_name, property, value_type } => {
            graph.schema_mut().add_property(&type_name, &property, value_type.as_str())?
        }
        Command::EditProperty { type_name, property, value_type } => {
            graph.edit_property_type(&type_name, &property, value_type.as_str())?
        }
        Command::RemoveProperty { type_name, property } => {
            graph.remove_property(&type_name, &property)?
        }
        Command::MakeParent { parent, child } => graph.make_parent(&parent, &child)?,
        Command::EditParent { child, parent } => graph.edit_parent(&child, &parent)?,
        Command::RemoveParent { child } => graph.remove_parent(&child)?,
        Command::ShowType { name } => {
            let schema = graph.schema();
            println!("{}", serde_json::to_string_pretty(schema.show_type(&name)?)?);
            for (property, value_type) in schema.effective_properties(&name)? {
                let origin = if schema.is_inherited_property(&name, &property) { " (inherited)" } else { "" };
                println!("{property}: {value_type}{origin}");
            }
        }
        Command::Create { type_name } => println!("{}", graph.create_from_type(&type_name)?),
        Command::Copy { id } => println!("{}", graph.create_from_copy(&EntityId::from(id))?),
        Command::SmartCopy { id } => println!("{}", graph.create_from_smart_copy(&EntityId::from(id))?),
        Command::Set { id, property, value } => {
            let id = EntityId::from(id);
            let value = parse_value(graph, &id, &property, &value)?;
            graph.edit_property(&id, &property, value)?;
        }
        Command::Audit => {
            let findings = graph.audit();
            for finding in &findings {
                println!("{finding}");
            }
            if !findings.is_empty() {
                // Read-only: nothing to save.
                return Err(format!("{} audit finding(s)", findings.len()).into());
            }
        }
        Command::Search { query, type_name } => {
            for id in graph.search(&query, type_name.as_deref())? {
                println!("{id}");
            }
        }
        Command::Levels { type_name } => {
            let ids = graph.get_ids_of_type(&type_name);
            for level in graph.aggregator().categorical_aggregation_paths(&ids)? {
                println!(
                    "{}\t{}\t{}\tgroups={}\tproportion={:.3}",
                    level.depth,
                    level.pointing_property,
                    level.aggregation_type,
                    level.n_groups,
                    level.aggregation_proportion
                );
            }
        }
        Command::Aggregate { type_name, property, levels, function } => {
            let keys = levels.iter().map(|s| parse_level(s)).collect::<Result<Vec<_>, _>>()?;
            let ids = graph.get_ids_of_type(&type_name);
            let fun: fn(&[PropertyValue]) -> PropertyValue = match function {
                Reduction::Mean => reduce::mean,
                Reduction::Sum => reduce::sum,
                Reduction::Count => reduce::count,
            };
            for group in graph.aggregator().categorical_aggregation(&ids, &property, fun, &keys)? {
                let slots: Vec<String> = group
                    .group
                    .iter()
                    .map(|slot| slot.as_ref().map_or_else(|| "-".to_owned(), |id| id.to_string()))
                    .collect();
                println!("{}\t{}\tn={}", slots.join(","), group.value, group.ids.len());
            }
        }
    }

    lg.close()?;
    Ok(())
}

/// Interpret a command line literal against the property's declared type.
fn parse_value(graph: &Graph, id: &EntityId, property: &str, raw: &str) -> lifegraph::Result<PropertyValue> {
    let type_name = &graph.entity(id)?.type_name;
    Ok(parse_literal(graph.schema().property_type(type_name, property), raw))
}

/// `null`/`UNKNOWN` clear a value. String and date properties keep the
/// literal as text, integer properties take numbers, and declared types
/// take an entity id. Undeclared properties get text and are rejected later.
fn parse_literal(value_type: Option<&ValueType>, raw: &str) -> PropertyValue {
    if raw.eq_ignore_ascii_case("null") || raw == "UNKNOWN" {
        return PropertyValue::Unknown;
    }
    match value_type {
        Some(ValueType::Declared(_)) => PropertyValue::Ref(EntityId::from(raw)),
        Some(ValueType::Leaf(LeafKind::Integer)) => {
            if let Ok(n) = raw.parse::<i64>() {
                PropertyValue::Integer(n)
            } else if let Ok(x) = raw.parse::<f64>() {
                PropertyValue::Float(x)
            } else {
                PropertyValue::Text(raw.to_owned())
            }
        }
        Some(ValueType::Leaf(LeafKind::String | LeafKind::Date)) | None => {
            PropertyValue::Text(raw.to_owned())
        }
    }
}

fn parse_level(raw: &str) -> Result<LevelKey, String> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(depth), Some(property), Some(type_name)) => {
            let depth = depth.parse().map_err(|_| format!("bad depth in level {raw:?}"))?;
            Ok(LevelKey::new(depth, property, type_name))
        }
        _ => Err(format!("level {raw:?} is not depth:pointing_property:type")),
    }
}
