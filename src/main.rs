//! undbpf - A tool for extracting and patching SimCity 4 DBPF files
//!
//! Usage:
//!   undbpf list <dat_file>                 - List archive entries
//!   undbpf info <dat_file>                 - Show archive information
//!   undbpf extract <path>... -o lots.json  - Extract LotConfigurations to JSON
//!   undbpf generate <lots.json> -o <dir>   - Build growth-blocking patches
//!   undbpf datpack <dir> -o <file.dat>     - Merge patch archives into one
//!   undbpf verify <dat_file>               - Inspect a generated patch

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use undbpf::dbpf::{COHORT_TYPE_ID, EXEMPLAR_TYPE_ID, LOT_CONFIG_GROUP_ID, PATCH_COHORT_GROUP_ID};
use undbpf::exemplar::{
    decode_payload, PropertyNameTable, PropertyValue, PROP_MIN_SLOPE, PROP_PATCH_TARGETS,
};
use undbpf::lots::{classify, combination_from_label, group_label, LotConfiguration};
use undbpf::patch::{build_blocker, PatchIdRange};
use undbpf::{
    collect_dbpf_files, format_size, merge, qfs, DbpfFile, DbpfWriteOptions,
};

#[derive(Parser)]
#[command(name = "undbpf")]
#[command(author = "xkeyC")]
#[command(version = "0.1.0")]
#[command(about = "Extract and patch SimCity 4 DBPF files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries in a DBPF archive
    List {
        /// Path to the .dat file
        dat_file: PathBuf,
    },
    /// Show archive information
    Info {
        /// Path to the .dat file
        dat_file: PathBuf,
    },
    /// Extract LotConfiguration exemplars to a JSON report
    Extract {
        /// DBPF files or directories to scan
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Output JSON path
        #[arg(short, long, default_value = "lot_configurations.json")]
        output: PathBuf,
    },
    /// Generate growth-blocking patch archives from a JSON report
    Generate {
        /// JSON report produced by `extract`
        report: PathBuf,
        /// Output directory for the .dat patches
        #[arg(short, long, default_value = "output_patches")]
        output: PathBuf,
        /// Only these purpose/wealth groups (e.g. R$,CS$$,I-ht$$$)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Filename prefix for generated patches
        #[arg(long, default_value = "stop_growable_")]
        prefix: String,
        /// Base of the private cohort instance-id range
        #[arg(long, value_parser = parse_hex_u32, default_value = "0xfe7ce000")]
        id_base: u32,
        /// Size of the private cohort instance-id range
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x1000")]
        id_range: u32,
        /// Also merge the generated patches into a single archive
        #[arg(long)]
        datpack: Option<PathBuf>,
    },
    /// Merge every DBPF archive in a directory into one
    Datpack {
        /// Directory holding the source archives
        input_dir: PathBuf,
        /// Output archive path
        #[arg(short, long, default_value = "datpacked.dat")]
        output: PathBuf,
        /// Remove source files after a successful merge
        #[arg(long)]
        remove_source: bool,
    },
    /// Inspect a generated patch archive
    Verify {
        /// Path to the patch .dat file
        dat_file: PathBuf,
    },
}

/// JSON hand-off between `extract` and `generate`
#[derive(Serialize, Deserialize)]
struct LotReport {
    total_lot_configurations: usize,
    source_files: Vec<String>,
    lot_configurations: Vec<LotConfiguration>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List { dat_file } => list_entries(&dat_file),
        Commands::Info { dat_file } => show_info(&dat_file),
        Commands::Extract { inputs, output } => extract_lots(&inputs, &output),
        Commands::Generate {
            report,
            output,
            only,
            prefix,
            id_base,
            id_range,
            datpack,
        } => generate_patches(
            &report,
            &output,
            &only,
            &prefix,
            PatchIdRange {
                base: id_base,
                size: id_range,
            },
            datpack.as_deref(),
        ),
        Commands::Datpack {
            input_dir,
            output,
            remove_source,
        } => datpack_directory(&input_dir, &output, remove_source),
        Commands::Verify { dat_file } => verify_patch(&dat_file),
    }
}

fn parse_hex_u32(s: &str) -> std::result::Result<u32, String> {
    let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).map_err(|e| format!("invalid hex value {:?}: {}", s, e))
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    )?);
    Ok(pb)
}

fn list_entries(dat_path: &Path) -> Result<()> {
    println!("Opening {}...", dat_path.display());

    let dat = DbpfFile::open(dat_path)
        .with_context(|| format!("Failed to open {}", dat_path.display()))?;

    let mut total_size = 0u64;
    for entry in dat.entries() {
        let raw = dat.raw_entry(entry);
        let packed = if qfs::is_compressed(raw) { "QFS" } else { "Plain" };
        println!(
            "{} {:>10} {:>6}",
            entry.tgi,
            format_size(entry.size as u64),
            packed
        );
        total_size += entry.size as u64;
    }

    println!();
    println!("Total: {} entries, {}", dat.len(), format_size(total_size));

    Ok(())
}

fn show_info(dat_path: &Path) -> Result<()> {
    println!("Opening {}...", dat_path.display());

    let dat = DbpfFile::open(dat_path)
        .with_context(|| format!("Failed to open {}", dat_path.display()))?;

    let mut by_type: BTreeMap<u32, u64> = BTreeMap::new();
    let mut compressed = 0u64;
    let mut total_size = 0u64;
    for entry in dat.entries() {
        *by_type.entry(entry.tgi.type_id).or_default() += 1;
        if qfs::is_compressed(dat.raw_entry(entry)) {
            compressed += 1;
        }
        total_size += entry.size as u64;
    }

    println!();
    println!("Archive Information:");
    println!("  File: {}", dat_path.display());
    println!(
        "  Format version: {}.{}",
        dat.header.major_version, dat.header.minor_version
    );
    println!("  Index version: {}", dat.header.index_major);
    println!("  Entries: {}", dat.len());
    println!("  Data size: {}", format_size(total_size));
    println!("  QFS-compressed entries: {}", compressed);
    println!();
    println!("Entries by type:");
    for (type_id, count) in by_type {
        let label = match type_id {
            EXEMPLAR_TYPE_ID => " (Exemplar)",
            COHORT_TYPE_ID => " (Cohort)",
            _ => "",
        };
        println!("  0x{:08X}{}: {} entries", type_id, label, count);
    }

    Ok(())
}

fn extract_lots(inputs: &[PathBuf], output: &Path) -> Result<()> {
    // Expand directories into the DBPF files they contain
    let mut files: Vec<PathBuf> = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(collect_dbpf_files(input)?);
        } else {
            files.push(input.clone());
        }
    }
    if files.is_empty() {
        bail!("no DBPF files found in the given inputs");
    }

    println!("Scanning {} file(s) for LotConfigurations...", files.len());

    let mut lots: Vec<LotConfiguration> = Vec::new();
    let mut source_files: Vec<String> = Vec::new();
    let mut failed_entries = 0u64;

    for path in &files {
        // One bad archive must not sink the whole batch
        let dat = match DbpfFile::open(path) {
            Ok(dat) => dat,
            Err(e) => {
                eprintln!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        source_files.push(path.display().to_string());

        let entries: Vec<_> = dat
            .entries_matching(Some(EXEMPLAR_TYPE_ID), Some(LOT_CONFIG_GROUP_ID))
            .cloned()
            .collect();
        if entries.is_empty() {
            continue;
        }

        println!(
            "   {}: {} LotConfiguration entries",
            path.display(),
            entries.len()
        );
        let pb = progress_bar(entries.len() as u64)?;

        for entry in &entries {
            let decoded = dat
                .extract_entry(entry)
                .and_then(|payload| decode_payload(&payload));
            match decoded {
                Ok(exemplar) => lots.push(classify(entry.tgi, &exemplar)),
                Err(e) => {
                    pb.println(format!("Error decoding {}: {}", entry.tgi, e));
                    failed_entries += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    let report = LotReport {
        total_lot_configurations: lots.len(),
        source_files,
        lot_configurations: lots,
    };
    fs::write(output, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!();
    println!(
        "Extracted {} LotConfigurations to {}",
        report.total_lot_configurations,
        output.display()
    );
    if failed_entries > 0 {
        println!("Failed entries: {}", failed_entries);
    }

    Ok(())
}

fn generate_patches(
    report_path: &Path,
    output_dir: &Path,
    only: &[String],
    prefix: &str,
    id_range: PatchIdRange,
    datpack_output: Option<&Path>,
) -> Result<()> {
    let report: LotReport = serde_json::from_str(
        &fs::read_to_string(report_path)
            .with_context(|| format!("Failed to read {}", report_path.display()))?,
    )
    .with_context(|| format!("Invalid report JSON in {}", report_path.display()))?;

    println!(
        "Read {} LotConfigurations from {}",
        report.lot_configurations.len(),
        report_path.display()
    );

    // Optional group filter
    let mut allowed = Vec::new();
    for label in only {
        match combination_from_label(label) {
            Some(combo) => allowed.push(combo),
            None => bail!("unknown purpose/wealth group {:?}", label),
        }
    }
    if !allowed.is_empty() {
        println!("Filtering to {} group(s)", allowed.len());
    }

    // Group patch targets by (purpose, wealth); BTreeMap keeps the
    // output ordering stable across runs
    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    let mut excluded = 0u64;
    for lot in &report.lot_configurations {
        let keys = lot.group_keys();
        if keys.is_empty() {
            excluded += 1;
            continue;
        }
        for (purpose, wealth) in keys {
            if !allowed.is_empty() && !allowed.contains(&(purpose, wealth)) {
                continue;
            }
            groups
                .entry(group_label(purpose, wealth))
                .or_default()
                .push(lot.instance_id);
        }
    }

    println!("Excluded lots (reserved zones or missing properties): {}", excluded);

    if groups.is_empty() {
        bail!("no patchable lots after grouping and filtering");
    }

    fs::create_dir_all(output_dir)?;
    let names = PropertyNameTable::default();
    let write_options = DbpfWriteOptions::default();

    println!("Generating {} patch file(s) in {}/...", groups.len(), output_dir.display());

    let mut written = Vec::new();
    for (label, targets) in &groups {
        let patch = build_blocker(LOT_CONFIG_GROUP_ID, targets, id_range, &names)?;
        let filename = format!("{}{}.dat", prefix, label);
        let path = output_dir.join(&filename);
        fs::write(&path, patch.to_archive_bytes(&write_options)?)?;
        println!(
            "  -> {} (IID 0x{:08X}, {} targets)",
            filename, patch.instance_id, patch.target_count
        );
        written.push(path);
    }

    println!();
    println!("Generated {} patch files", written.len());

    if let Some(packed) = datpack_output {
        println!();
        println!("Datpacking into {}...", packed.display());
        let inputs = open_archives(&written)?;
        let result = merge(&inputs);
        report_conflicts(&result.conflicts);
        fs::write(packed, result.serialize(&write_options)?)?;
        println!(
            "Created {} ({} entries, {})",
            packed.display(),
            result.entries.len(),
            format_size(result.data_size() as u64)
        );
    }

    Ok(())
}

fn open_archives(paths: &[PathBuf]) -> Result<Vec<(String, DbpfFile)>> {
    let mut inputs = Vec::new();
    for path in paths {
        let dat = DbpfFile::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        inputs.push((label, dat));
    }
    Ok(inputs)
}

fn report_conflicts(conflicts: &[undbpf::MergeConflict]) {
    for conflict in conflicts {
        println!(
            "  WARNING: duplicate key {} ({} overrides {})",
            conflict.key, conflict.kept, conflict.replaced
        );
    }
    if !conflicts.is_empty() {
        println!("  {} duplicate key(s) resolved last-write-wins", conflicts.len());
    }
}

fn datpack_directory(input_dir: &Path, output: &Path, remove_source: bool) -> Result<()> {
    let files = collect_dbpf_files(input_dir)?;
    if files.is_empty() {
        bail!("no DBPF files found in {}", input_dir.display());
    }

    println!("Found {} DBPF file(s) in {}", files.len(), input_dir.display());

    let pb = progress_bar(files.len() as u64)?;
    let mut inputs = Vec::new();
    for path in &files {
        pb.set_message(path.display().to_string());
        match DbpfFile::open(path) {
            Ok(dat) => {
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                inputs.push((label, dat));
            }
            Err(e) => pb.println(format!("Skipping {}: {}", path.display(), e)),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let result = merge(&inputs);
    report_conflicts(&result.conflicts);

    let bytes = result.serialize(&DbpfWriteOptions::default())?;
    fs::write(output, &bytes)?;

    println!();
    println!(
        "Created {}: {} entries, {}",
        output.display(),
        result.entries.len(),
        format_size(bytes.len() as u64)
    );

    if remove_source {
        let mut removed = 0usize;
        for path in &files {
            if path == output {
                continue;
            }
            match fs::remove_file(path) {
                Ok(_) => removed += 1,
                Err(e) => eprintln!("Could not remove {}: {}", path.display(), e),
            }
        }
        println!("Removed {}/{} source files", removed, files.len());
    }

    Ok(())
}

fn verify_patch(dat_path: &Path) -> Result<()> {
    println!("Opening {}...", dat_path.display());

    let dat = DbpfFile::open(dat_path)
        .with_context(|| format!("Failed to open {}", dat_path.display()))?;

    let cohorts: Vec<_> = dat
        .entries_matching(Some(COHORT_TYPE_ID), Some(PATCH_COHORT_GROUP_ID))
        .cloned()
        .collect();
    if cohorts.is_empty() {
        bail!("no patch cohorts in {}", dat_path.display());
    }

    for entry in &cohorts {
        let payload = dat.extract_entry(entry)?;
        let cohort = decode_payload(&payload)?;

        println!();
        println!("Cohort {}", entry.tgi);
        println!("  Properties: {}", cohort.properties.len());

        match cohort.property(PROP_PATCH_TARGETS).map(|p| &p.value) {
            Some(PropertyValue::Uint32(pairs)) if pairs.len() % 2 == 0 => {
                println!("  Targets: {} exemplars", pairs.len() / 2);
            }
            Some(_) => println!("  WARNING: malformed target list"),
            None => println!("  WARNING: no target list property"),
        }
        match cohort.property(PROP_MIN_SLOPE).map(|p| &p.value) {
            Some(PropertyValue::Float32(v)) if v.len() == 1 => {
                println!("  MinSlope override: {:.1} degrees", v[0]);
            }
            Some(_) => println!("  WARNING: malformed MinSlope override"),
            None => println!("  WARNING: no MinSlope override"),
        }
        if !cohort.complete {
            println!("  WARNING: property stream ended early");
        }
    }

    println!();
    println!("Verified {} cohort(s)", cohorts.len());

    Ok(())
}
