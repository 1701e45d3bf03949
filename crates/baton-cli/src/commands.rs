use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use baton_client::json::{
    add_error, optional_str, path_json, required_str, target_path, ACCESS_KEY, AVUS_KEY,
    CHECKSUM_KEY, COLLECTION_KEY, DATA_OBJECT_KEY, SIZE_KEY,
};
use baton_client::{
    apply_json_operations, atomic_apply_json_operations, create_collection, list_metadata,
    list_path, lookup_path, maybe_modify_json_metadata, modify_json_metadata,
    modify_json_permissions, put_data_obj, read_data_obj, remove_collection, remove_data_object,
    resolve_path, resolve_target, search_metadata, search_specific, supersede_metadata,
    write_data_obj, BatonError, BatonResult, ErrorReport,
};
use baton_rpc::Connection;
use baton_types::{join_path, ChecksumPolicy, EntityKind, ListOptions, MetadataOp, OperationOptions};

use crate::cli::*;
use crate::config::CliConfig;

pub const OPERATIONS_KEY: &str = "operations";
pub const DIRECTORY_KEY: &str = "directory";
pub const FILE_KEY: &str = "file";
pub const DATA_KEY: &str = "data";

/// What one target produced.
#[derive(Debug)]
pub enum Output {
    Json(Value),
    Raw(Vec<u8>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub failed: usize,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.sandbox {
        config.sandbox.state_file = Some(path.clone());
    }
    let mut server = config.open_sandbox()?;

    let input: Box<dyn Read> = match &cli.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut out = BufWriter::new(io::stdout().lock());

    let stats = process_targets(input, &mut out, cli.unbuffered, |target| {
        dispatch(&cli.command, &mut server, &config, target)
    })?;
    out.flush()?;

    if modifies_catalog(&cli.command) {
        config.save_sandbox(server)?;
    }
    info!(processed = stats.processed, failed = stats.failed, "done");
    if stats.failed > 0 {
        anyhow::bail!("{} of {} targets failed", stats.failed, stats.processed);
    }
    Ok(())
}

/// Run `op` on each JSON value read from `input`, writing one result per
/// target. A failed target is written back with an `error` member and
/// processing continues; malformed input stops the run.
pub fn process_targets<R, W, F>(
    input: R,
    out: &mut W,
    unbuffered: bool,
    mut op: F,
) -> anyhow::Result<RunStats>
where
    R: Read,
    W: Write,
    F: FnMut(&Value) -> BatonResult<Output>,
{
    let mut stats = RunStats::default();
    for item in serde_json::Deserializer::from_reader(input).into_iter::<Value>() {
        let target = item.context("failed to parse JSON input")?;
        stats.processed += 1;
        match op(&target) {
            Ok(Output::Json(value)) => write_json(out, &value)?,
            Ok(Output::Raw(bytes)) => out.write_all(&bytes)?,
            Err(err) => {
                stats.failed += 1;
                let mut reported = if target.is_object() { target } else { json!({}) };
                add_error(&mut reported, &ErrorReport::from(&err));
                write_json(out, &reported)?;
            }
        }
        if unbuffered {
            out.flush()?;
        }
    }
    Ok(stats)
}

fn write_json<W: Write>(out: &mut W, value: &Value) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn modifies_catalog(command: &Command) -> bool {
    !matches!(
        command,
        Command::Get(_) | Command::Metaquery(_) | Command::Specificquery(_) | Command::List(_)
    )
}

pub fn dispatch<C: Connection + ?Sized>(
    command: &Command,
    conn: &mut C,
    config: &CliConfig,
    target: &Value,
) -> BatonResult<Output> {
    let env = &config.session;
    match command {
        Command::Metamod(args) => cmd_metamod(conn, config, args, target),
        Command::Metasuper(_) => {
            let path = resolve_target(conn, env, target)?;
            supersede_metadata(conn, &path, required_member(target, AVUS_KEY)?)?;
            Ok(Output::Json(target.clone()))
        }
        Command::Put(args) => cmd_put(conn, config, args, target),
        Command::Get(args) => cmd_get(conn, config, args, target),
        Command::Chmod(args) => cmd_chmod(conn, config, args, target),
        Command::Metaquery(args) => {
            let options = args.decoration.list_options(false);
            search_metadata(conn, target, args.zone.as_deref(), &options).map(Output::Json)
        }
        Command::Specificquery(args) => {
            search_specific(conn, target, args.zone.as_deref()).map(Output::Json)
        }
        Command::List(args) => {
            let path = resolve_target(conn, env, target)?;
            list_path(conn, &path, &args.decoration.list_options(args.contents)).map(Output::Json)
        }
        Command::Mkcoll(args) => {
            let path = lookup_path(conn, env, &target_path(target)?)?;
            let mut options = OperationOptions::new();
            if args.recurse {
                options = options.with_recursive();
            }
            create_collection(conn, &path, &options)?;
            Ok(Output::Json(path_json(&path)))
        }
        Command::Rm(args) => {
            let path = resolve_target(conn, env, target)?;
            let mut options = OperationOptions::new();
            if args.recurse {
                options = options.with_recursive();
            }
            if args.force {
                options = options.with_force();
            }
            match path.kind() {
                Some(EntityKind::DataObject) => remove_data_object(conn, &path)?,
                _ => remove_collection(conn, &path, &options)?,
            }
            Ok(Output::Json(target.clone()))
        }
    }
}

fn cmd_metamod<C: Connection + ?Sized>(
    conn: &mut C,
    config: &CliConfig,
    args: &MetamodArgs,
    target: &Value,
) -> BatonResult<Output> {
    let path = resolve_target(conn, &config.session, target)?;

    if let Some(operations) = target.get(OPERATIONS_KEY) {
        if args.atomic {
            atomic_apply_json_operations(conn, &path, operations)?;
        } else {
            let applied = apply_json_operations(conn, &path, operations)?;
            debug!(path = %path, applied, "applied operations");
        }
        return Ok(Output::Json(target.clone()));
    }

    let Some(op) = args.operation.map(MetadataOp::from) else {
        return Err(rejected(BatonError::InvalidArgument(format!(
            "no --operation given and target has no {OPERATIONS_KEY}"
        ))));
    };
    let avus = required_member(target, AVUS_KEY)?;

    if args.atomic {
        atomic_apply_json_operations(conn, &path, &as_operations(op, avus)?)?;
        return Ok(Output::Json(target.clone()));
    }
    match op {
        // Adding an AVU that is already present is not an error
        MetadataOp::Add => {
            let current = list_metadata(conn, &path, None)?;
            maybe_modify_json_metadata(conn, &path, op, avus, &current)?;
        }
        MetadataOp::Remove => {
            for avu in as_array(avus, AVUS_KEY)? {
                modify_json_metadata(conn, &path, op, avu)?;
            }
        }
    }
    Ok(Output::Json(target.clone()))
}

fn cmd_put<C: Connection + ?Sized>(
    conn: &mut C,
    config: &CliConfig,
    args: &PutArgs,
    target: &Value,
) -> BatonResult<Output> {
    let local = local_file(target)?;
    let collection = required_str(target, COLLECTION_KEY)?;
    let raw = join_path(collection, &remote_name(target)?);
    let path = lookup_path(conn, &config.session, &raw)?;
    let options = args
        .operation_options()
        .with_checksum_policy(checksum_policy(args.strict_checksum, config));

    if args.buffered {
        let buffer_size = args.buffer_size.unwrap_or(config.transfer.buffer_size);
        let mut file = File::open(&local).map_err(|err| rejected(err.into()))?;
        write_data_obj(conn, &mut file, &path, buffer_size, &options)?;
    } else {
        put_data_obj(conn, &local, &path, &options)?;
    }

    let mut result = target.clone();
    if args.checksum {
        let stored = resolve_path(conn, &config.session, &raw)?;
        let listing = ListOptions {
            checksum: true,
            ..ListOptions::default()
        };
        let listed = list_path(conn, &stored, &listing)?;
        if let (Some(obj), Some(checksum)) = (result.as_object_mut(), listed.get(CHECKSUM_KEY)) {
            obj.insert(CHECKSUM_KEY.to_string(), checksum.clone());
        }
    }
    Ok(Output::Json(result))
}

fn cmd_get<C: Connection + ?Sized>(
    conn: &mut C,
    config: &CliConfig,
    args: &GetArgs,
    target: &Value,
) -> BatonResult<Output> {
    let path = resolve_target(conn, &config.session, target)?;
    let buffer_size = args.buffer_size.unwrap_or(config.transfer.buffer_size);
    let policy = checksum_policy(args.strict_checksum, config);

    if args.save {
        let local = local_file(target)?;
        let mut file = File::create(&local).map_err(|err| rejected(err.into()))?;
        let summary = read_data_obj(conn, &path, &mut file, buffer_size, policy)?;
        info!(local = %local.display(), bytes = summary.bytes, "saved data object");
        return Ok(Output::Json(target.clone()));
    }

    let mut content = Vec::new();
    let summary = read_data_obj(conn, &path, &mut content, buffer_size, policy)?;
    if args.raw {
        return Ok(Output::Raw(content));
    }
    let mut result = path_json(&path);
    if let Some(obj) = result.as_object_mut() {
        obj.insert(
            DATA_KEY.to_string(),
            Value::String(String::from_utf8_lossy(&content).into_owned()),
        );
        obj.insert(CHECKSUM_KEY.to_string(), Value::String(summary.md5));
        obj.insert(SIZE_KEY.to_string(), json!(summary.bytes));
    }
    Ok(Output::Json(result))
}

fn cmd_chmod<C: Connection + ?Sized>(
    conn: &mut C,
    config: &CliConfig,
    args: &ChmodArgs,
    target: &Value,
) -> BatonResult<Output> {
    let path = resolve_target(conn, &config.session, target)?;
    for acl in as_array(required_member(target, ACCESS_KEY)?, ACCESS_KEY)? {
        modify_json_permissions(conn, &path, args.recurse, acl)?;
    }
    Ok(Output::Json(target.clone()))
}

// ---------------------------------------------------------------------------
// Target helpers
// ---------------------------------------------------------------------------

fn rejected(err: BatonError) -> BatonError {
    error!("{err}");
    err
}

fn required_member<'a>(target: &'a Value, key: &str) -> BatonResult<&'a Value> {
    target
        .get(key)
        .ok_or_else(|| rejected(BatonError::InvalidJson(format!("target has no {key}: {target}"))))
}

fn as_array<'a>(value: &'a Value, key: &str) -> BatonResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| rejected(BatonError::InvalidJson(format!("{key} is not a JSON array"))))
}

/// `avus` tagged with `op`, in the form atomic application expects.
fn as_operations(op: MetadataOp, avus: &Value) -> BatonResult<Value> {
    let tagged = as_array(avus, AVUS_KEY)?
        .iter()
        .map(|avu| {
            let mut tagged = avu.clone();
            if let Some(obj) = tagged.as_object_mut() {
                obj.insert("operation".to_string(), Value::String(op.as_str().to_string()));
            }
            tagged
        })
        .collect();
    Ok(Value::Array(tagged))
}

/// The data object name for an upload: `data_object`, else the local `file`.
fn remote_name(target: &Value) -> BatonResult<String> {
    match optional_str(target, DATA_OBJECT_KEY)?.or(optional_str(target, FILE_KEY)?) {
        Some(name) => Ok(name.to_string()),
        None => Err(rejected(BatonError::InvalidJson(format!(
            "target names neither {DATA_OBJECT_KEY} nor {FILE_KEY}: {target}"
        )))),
    }
}

/// The local file of a target: `directory` (default `.`) joined with `file`,
/// or with the data object name when `file` is absent.
fn local_file(target: &Value) -> BatonResult<PathBuf> {
    let directory = optional_str(target, DIRECTORY_KEY)?.unwrap_or(".");
    let name = match optional_str(target, FILE_KEY)? {
        Some(file) => file.to_string(),
        None => remote_name(target)?,
    };
    Ok(PathBuf::from(directory).join(name))
}

fn checksum_policy(strict: bool, config: &CliConfig) -> ChecksumPolicy {
    if strict {
        ChecksumPolicy::Fail
    } else {
        config.transfer.checksum_policy
    }
}
