use std::io::{self, BufWriter, Write};
use std::{env, process};

use anyhow::{Result, bail};
use pbindex::index::codec;
use pbindex::{BarcodeFields, Filter, FilterContext, LookupIndex, PbiFilter, Property};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: pbindex <file.pbi> [name op value ...]";

fn print_summary<W: Write>(writer: &mut W, index: &LookupIndex) -> Result<()> {
    let raw = index.raw();
    writeln!(writer, "version:\t{}", raw.version())?;
    writeln!(writer, "sections:\t{}", raw.sections())?;
    writeln!(writer, "reads:\t{}", index.num_reads())?;

    if let Some(mapped) = index.mapped_lookup() {
        writeln!(writer, "forward:\t{}", mapped.forward_strand_rows.len())?;
        writeln!(writer, "reverse:\t{}", mapped.reverse_strand_rows.len())?;
    }
    let references = index.reference_data();
    for t_id in references.reference_ids() {
        let rows = references.rows(t_id);
        writeln!(writer, "reference {t_id}:\trows {}..{}", rows.start, rows.end)?;
    }
    if let Some(barcode) = index.barcode_data() {
        let barcoded = (0..barcode.len())
            .filter(|&row| {
                BarcodeFields {
                    forward: barcode.bc_forward[row],
                    reverse: barcode.bc_reverse[row],
                    quality: barcode.bc_qual[row],
                }
                .is_valid()
            })
            .count();
        writeln!(writer, "barcoded:\t{barcoded}")?;
    }
    Ok(())
}

fn parse_properties(args: &[String]) -> Result<Vec<Property>> {
    if args.len() % 3 != 0 {
        bail!("filter properties come in (name, op, value) triples\n{USAGE}");
    }
    Ok(args
        .chunks_exact(3)
        .map(|triple| Property::new(&triple[0], &triple[2], &triple[1]))
        .collect())
}

fn print_rows<W: Write>(writer: &mut W, index: &LookupIndex, properties: &[Property]) -> Result<()> {
    let filter = PbiFilter::from_properties(properties, &FilterContext::default())?;
    let rows = filter.rows(index.raw());
    for &row in &rows {
        if let Some(offset) = index.file_offset(row) {
            writeln!(writer, "{row}\t{offset}")?;
        }
    }
    eprintln!("{} of {} rows accepted", rows.len(), index.num_reads());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((path, query)) = args.split_first() else {
        eprintln!("{USAGE}");
        process::exit(2);
    };

    let index = LookupIndex::new(codec::load(path)?);
    let mut writer = BufWriter::new(io::stdout().lock());
    if query.is_empty() {
        print_summary(&mut writer, &index)?;
    } else {
        let properties = parse_properties(query)?;
        print_rows(&mut writer, &index, &properties)?;
    }
    writer.flush()?;
    Ok(())
}
