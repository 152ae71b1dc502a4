use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::deleter::{Deleter, Status};
use crate::graph::{TableGraph, TableId};
use crate::util::format_number;

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Renders one progress bar per table, fed from the deleters' lock-free
/// state. Rendering only observes; it never drives the deletion.
pub struct ProgressRenderer {
    bars: Vec<(TableId, ProgressBar)>,
    refresher: JoinHandle<()>,
}

impl ProgressRenderer {
    /// Adds a bar per table (parents above their children) and spawns the
    /// periodic refresh task.
    pub fn start(graph: Arc<TableGraph>) -> Self {
        let multi = MultiProgress::new();
        let name_width = graph
            .tables()
            .iter()
            .map(|table| table.name().len())
            .max()
            .unwrap_or(0)
            + 2;

        let style = ProgressStyle::with_template(
            "{elapsed:>5} {prefix} {msg} [{wide_bar:.cyan/blue}] {percent:>3}%",
        )
        .expect("valid progress template")
        .progress_chars("#>-");

        let bars: Vec<(TableId, ProgressBar)> = graph
            .flatten()
            .into_iter()
            .map(|id| {
                let table = graph.table(id);
                let bar = multi.add(
                    ProgressBar::new(100)
                        .with_style(style.clone())
                        .with_prefix(format!("{:<name_width$}", format!("{}:", table.name()))),
                );
                (id, bar)
            })
            .collect();

        let refresh_graph = Arc::clone(&graph);
        let refresh_bars = bars.clone();
        let refresher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                for (id, bar) in &refresh_bars {
                    update_bar(refresh_graph.table(*id).deleter(), bar);
                }
            }
        });

        Self { bars, refresher }
    }

    /// Draws the final state of every bar and stops refreshing.
    pub fn finish(self, graph: &TableGraph) {
        self.refresher.abort();
        for (id, bar) in &self.bars {
            update_bar(graph.table(*id).deleter(), bar);
            bar.finish();
        }
    }
}

fn update_bar(deleter: &Deleter, bar: &ProgressBar) {
    let status = deleter.status();
    let total = deleter.total_rows();
    let deleted = total.saturating_sub(deleter.remaining_rows());

    let label = match status {
        Status::Analyzing => "analyzing",
        Status::Waiting => "waiting",
        Status::Deleting | Status::CascadeDeleting => "deleting",
        Status::Completed => "completed",
    };
    bar.set_message(format!(
        "{label:<9} ({} / {})",
        format_number(deleted),
        format_number(total)
    ));

    let position = match status {
        // An empty table never observed a row; its bar still fills.
        Status::Completed => 100,
        Status::Analyzing => 0,
        _ if total == 0 => 0,
        _ => deleted * 100 / total,
    };
    bar.set_position(position);
}
