use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;

use crate::{
    daemon::storage::entities::ActivityStore,
    report::{
        chart::{render_monthly_chart, ChartRenderer},
        format_minutes, ledger_rows,
    },
    utils::time::month_name,
};

/// Prints a day's activity, largest first.
pub fn print_day(store: &ActivityStore, day: NaiveDate, out: &mut impl Write) -> Result<()> {
    let Some(ledger) = store.ledger(day) else {
        writeln!(out, "No data for {day}")?;
        return print_dates(store, out);
    };

    writeln!(out, "Activity for {day}")?;
    for row in ledger_rows(day, ledger) {
        writeln!(out, "{:>8}\t{:>8.2}\t{}", row.formatted, row.minutes, row.key)?;
    }
    writeln!(out, "{:>8}\t{:>8.2}\tTotal", format_minutes(ledger.total()), ledger.total())?;
    Ok(())
}

/// Lists the days with recorded activity, newest first.
pub fn print_dates(store: &ActivityStore, out: &mut impl Write) -> Result<()> {
    if store.is_empty() {
        writeln!(out, "No activity recorded yet")?;
        return Ok(());
    }
    writeln!(out, "Available dates:")?;
    for day in store.days().rev() {
        let total = store.ledger(day).map(|v| v.total()).unwrap_or_default();
        writeln!(out, "  {day}\t{}", format_minutes(total))?;
    }
    Ok(())
}

pub async fn print_chart(
    store: &ActivityStore,
    month: NaiveDate,
    top_n: usize,
    renderer: &impl ChartRenderer,
    out: &mut impl Write,
) -> Result<()> {
    match render_monthly_chart(store, month, top_n, renderer).await? {
        Some(path) => writeln!(out, "Chart for {} saved to {}", month_name(month), path.display())?,
        None => writeln!(out, "No data for {}", month_name(month))?,
    }
    Ok(())
}
