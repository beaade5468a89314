//! XML report sink.
//!
//! Serializes an [`Outcome`] into the report document: the product
//! listing with per-product probabilities and contributions, the top
//! probability with its approximation and accumulated warnings, the
//! importance records, and the uncertainty and SIL sections when present.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::analysis::Outcome;
use crate::error::Result;
use crate::model::Model;
use crate::settings::{Approximation, Settings};

fn approximation_name(approximation: Approximation) -> &'static str {
    match approximation {
        Approximation::Exact => "exact",
        Approximation::RareEvent => "rare-event",
        Approximation::Mcub => "mcub",
    }
}

pub fn write_report(
    outcome: &Outcome,
    model: &Model,
    settings: &Settings,
    sink: impl Write,
) -> Result<()> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("report")))?;

    let mut results = BytesStart::new("sum-of-products");
    results.push_attribute(("approximation", approximation_name(settings.approximation)));
    results.push_attribute(("probability", format!("{:.10e}", outcome.p_total).as_str()));
    results.push_attribute(("products", outcome.products.len().to_string().as_str()));
    results.push_attribute(("mission-time", settings.mission_time.to_string().as_str()));
    writer.write_event(Event::Start(results))?;

    for warning in &outcome.warnings {
        let mut element = BytesStart::new("warning");
        element.push_attribute(("message", warning.to_string().as_str()));
        writer.write_event(Event::Empty(element))?;
    }

    for product in &outcome.products {
        let mut element = BytesStart::new("product");
        element.push_attribute(("order", product.literals.len().to_string().as_str()));
        element.push_attribute(("probability", format!("{:.10e}", product.probability).as_str()));
        element.push_attribute(("contribution", format!("{:.10e}", product.contribution).as_str()));
        writer.write_event(Event::Start(element))?;
        for &literal in &product.literals {
            let name = &model.basic_events[(literal.unsigned_abs() - 1) as usize].name;
            let mut event = BytesStart::new("literal");
            event.push_attribute(("name", name.as_str()));
            if literal < 0 {
                event.push_attribute(("complement", "true"));
            }
            writer.write_event(Event::Empty(event))?;
        }
        writer.write_event(Event::End(BytesEnd::new("product")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("sum-of-products")))?;

    if !outcome.importance.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("importance")))?;
        for record in &outcome.importance {
            let mut element = BytesStart::new("basic-event");
            element.push_attribute(("name", record.event.as_str()));
            element.push_attribute(("probability", format!("{:.10e}", record.probability).as_str()));
            element.push_attribute(("MIF", format!("{:.6e}", record.measures.mif).as_str()));
            element.push_attribute(("CIF", format!("{:.6e}", record.measures.cif).as_str()));
            element.push_attribute(("DIF", format!("{:.6e}", record.measures.dif).as_str()));
            element.push_attribute(("RAW", format!("{:.6e}", record.measures.raw).as_str()));
            element.push_attribute(("RRW", format!("{:.6e}", record.measures.rrw).as_str()));
            writer.write_event(Event::Empty(element))?;
        }
        writer.write_event(Event::End(BytesEnd::new("importance")))?;
    }

    if let Some(uncertainty) = &outcome.uncertainty {
        let mut element = BytesStart::new("uncertainty");
        element.push_attribute(("trials", uncertainty.trials.to_string().as_str()));
        element.push_attribute(("mean", format!("{:.10e}", uncertainty.mean).as_str()));
        element.push_attribute(("std-dev", format!("{:.10e}", uncertainty.std_dev).as_str()));
        element.push_attribute(("q05", format!("{:.10e}", uncertainty.quantiles[0]).as_str()));
        element.push_attribute(("median", format!("{:.10e}", uncertainty.quantiles[1]).as_str()));
        element.push_attribute(("q95", format!("{:.10e}", uncertainty.quantiles[2]).as_str()));
        writer.write_event(Event::Start(element))?;
        for &(lower, upper, fraction) in &uncertainty.histogram {
            let mut bin = BytesStart::new("bin");
            bin.push_attribute(("lower", format!("{lower:.6e}").as_str()));
            bin.push_attribute(("upper", format!("{upper:.6e}").as_str()));
            bin.push_attribute(("fraction", format!("{fraction:.6}").as_str()));
            writer.write_event(Event::Empty(bin))?;
        }
        writer.write_event(Event::End(BytesEnd::new("uncertainty")))?;
    }

    if let Some(sil) = &outcome.sil {
        let mut element = BytesStart::new("safety-integrity-levels");
        element.push_attribute(("PFD-avg", format!("{:.10e}", sil.pfd_avg).as_str()));
        element.push_attribute(("PFH-avg", format!("{:.10e}", sil.pfh_avg).as_str()));
        writer.write_event(Event::Start(element))?;
        for (metric, fractions) in
            [("PFD", &sil.pfd_fractions), ("PFH", &sil.pfh_fractions)]
        {
            for (band, fraction) in fractions.iter().enumerate() {
                let mut entry = BytesStart::new("fraction");
                entry.push_attribute(("metric", metric));
                let label = match band {
                    0 => "below-SIL-1".to_string(),
                    5 => "above-SIL-4".to_string(),
                    n => format!("SIL-{n}"),
                };
                entry.push_attribute(("band", label.as_str()));
                entry.push_attribute(("value", format!("{fraction:.6}").as_str()));
                writer.write_event(Event::Empty(entry))?;
            }
        }
        for &(time, pfd) in &sil.buckets {
            let mut bucket = BytesStart::new("bucket");
            bucket.push_attribute(("time", format!("{time:.6e}").as_str()));
            bucket.push_attribute(("PFD", format!("{pfd:.10e}").as_str()));
            writer.write_event(Event::Empty(bucket))?;
        }
        writer.write_event(Event::End(BytesEnd::new("safety-integrity-levels")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("report")))?;
    Ok(())
}
