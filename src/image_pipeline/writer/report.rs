use std::time::{Duration, Instant};

use crate::image_pipeline::region::Region;

/// What happened to one piece of a streamed write.
#[derive(Debug, Clone)]
pub struct PieceReport<const D: usize> {
    pub piece: Region<D>,
    /// Part of the piece that was persisted, `None` when skipped
    pub written: Option<Region<D>>,
    pub bytes: u64,
    pub produce: Duration,
    pub persist: Duration,
}

#[derive(Debug, Default)]
pub struct WriteReport<const D: usize> {
    pieces: Vec<PieceReport<D>>,
    finish: Duration,
}

impl<const D: usize> WriteReport<D> {
    pub fn new() -> Self {
        Self {
            pieces: Vec::new(),
            finish: Duration::ZERO,
        }
    }

    pub fn add_piece(&mut self, piece: PieceReport<D>) {
        self.pieces.push(piece);
    }

    pub(crate) fn set_finish(&mut self, duration: Duration) {
        self.finish = duration;
    }

    pub fn pieces(&self) -> &[PieceReport<D>] {
        &self.pieces
    }

    pub fn pieces_written(&self) -> usize {
        self.pieces.iter().filter(|p| p.written.is_some()).count()
    }

    pub fn bytes_written(&self) -> u64 {
        self.pieces.iter().map(|p| p.bytes).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.pieces
            .iter()
            .map(|p| p.produce + p.persist)
            .sum::<Duration>()
            + self.finish
    }

    pub fn print_summary(&self) {
        let total = self.total_duration();
        println!("\nStreaming Write Summary:");
        println!("{:-<72}", "");
        for (i, piece) in self.pieces.iter().enumerate() {
            let spent = piece.produce + piece.persist;
            let percentage = if total.as_secs_f64() > 0.0 {
                (spent.as_secs_f64() / total.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            let status = match piece.written {
                Some(_) => format!("{} bytes", piece.bytes),
                None => "skipped".to_string(),
            };
            println!(
                "piece {:<4} {:<20} {:>12.3}ms ({:>5.1}%)",
                i,
                status,
                spent.as_secs_f64() * 1000.0,
                percentage
            );
        }
        println!("{:-<72}", "");
        println!(
            "{:<31} {:>12.3}ms",
            "Total",
            total.as_secs_f64() * 1000.0
        );
    }
}

pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}
