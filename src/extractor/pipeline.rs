use crate::config::PersistCadence;
use crate::error::{MmsMediaError, Result, UserFriendlyError};
use crate::extractor::media::decode_attachment;
use crate::extractor::stats::RunStats;
use crate::extractor::store::FingerprintStore;
use crate::extractor::writer::MediaWriter;
use crate::parser::{MessageRecord, MessageStream};
use crate::scanner::BackupFile;
use crate::ui::{OutputFormatter, ProgressManager};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Records in flight per dispatch wave, as a multiple of the worker count.
/// Bounds decoded-payload memory while keeping every worker busy.
const CHUNK_FACTOR: usize = 8;

/// Drives extraction: documents are read sequentially, their records fan out
/// across a worker pool, and every attachment flows through decode, dedup
/// reservation, and write.
///
/// Per-attachment and per-record failures are counted and reported; only a
/// failure to start the worker pool aborts the run.
pub struct ExtractionPipeline<'a> {
    writer: &'a MediaWriter,
    store: &'a FingerprintStore,
    stats: &'a RunStats,
    cadence: PersistCadence,
    formatter: &'a OutputFormatter,
    progress: &'a ProgressManager,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(
        writer: &'a MediaWriter,
        store: &'a FingerprintStore,
        stats: &'a RunStats,
        cadence: PersistCadence,
        formatter: &'a OutputFormatter,
        progress: &'a ProgressManager,
    ) -> Self {
        Self {
            writer,
            store,
            stats,
            cadence,
            formatter,
            progress,
        }
    }

    pub fn run(&self, backups: &[BackupFile], workers: usize, permissive: bool) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| MmsMediaError::Config {
                message: format!("failed to start worker pool: {}", e),
            })?;

        let doc_pb = self.progress.create_document_progress(backups.len() as u64);

        for backup in backups {
            doc_pb.set_message(format!("current: {}", backup.filename));
            self.process_document(&pool, backup, workers, permissive);

            if self.cadence == PersistCadence::PerDocument {
                self.checkpoint();
            }
            doc_pb.inc(1);
        }

        doc_pb.finish_with_message("all backups processed");
        Ok(())
    }

    /// Read one document's records and dispatch them in bounded waves.
    /// Open and parse failures skip the rest of this document; the run
    /// continues with the next one.
    fn process_document(
        &self,
        pool: &rayon::ThreadPool,
        backup: &BackupFile,
        workers: usize,
        permissive: bool,
    ) {
        let mut stream = match MessageStream::open(&backup.path, permissive) {
            Ok(stream) => stream,
            Err(error) => {
                self.report_error(&error);
                return;
            }
        };

        let spinner = self
            .progress
            .create_record_spinner(&format!("reading {}", backup.filename));
        let chunk_size = workers.max(1) * CHUNK_FACTOR;
        let mut dispatched = 0usize;

        loop {
            let mut chunk: Vec<MessageRecord> = Vec::with_capacity(chunk_size);
            let mut parse_failed = false;

            while chunk.len() < chunk_size {
                match stream.next_record() {
                    Ok(Some(record)) => chunk.push(record),
                    Ok(None) => break,
                    Err(error) => {
                        // The reader's position is unreliable after a parse
                        // error; drain what was collected, then drop the rest
                        // of this document.
                        self.report_error(&error);
                        parse_failed = true;
                        break;
                    }
                }
            }

            let drained = chunk.len() < chunk_size;

            if !chunk.is_empty() {
                dispatched += chunk.len();
                spinner.set_message(format!(
                    "{}: {} record(s) processed",
                    backup.filename, dispatched
                ));
                pool.install(|| {
                    chunk
                        .into_par_iter()
                        .for_each(|record| self.run_record(&record));
                });
            }

            if parse_failed || drained {
                break;
            }
        }

        spinner.finish_and_clear();
    }

    /// Process one record on a worker, isolating panics so a poisoned record
    /// cannot take the run down.
    fn run_record(&self, record: &MessageRecord) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.process_record(record)));

        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            self.report_error(&MmsMediaError::WorkerPanic { message });
        }

        if self.cadence == PersistCadence::PerRecord {
            self.checkpoint();
        }
    }

    fn process_record(&self, record: &MessageRecord) {
        let folder_key = record.folder_key();

        for (index, attachment) in record.attachments.iter().enumerate() {
            let context = format!("{}, part {}", folder_key, index);

            let Some(decoded) = decode_attachment(attachment, record.date_ms, &context) else {
                continue;
            };
            let media = match decoded {
                Ok(media) => media,
                Err(error) => {
                    self.report_error(&error);
                    continue;
                }
            };

            if media.guessed_extension {
                self.progress.suspend(|| {
                    self.formatter.warning(&format!(
                        "Guessed extension for wildcard type '{}' ({})",
                        attachment.content_type, context
                    ));
                });
            }

            if !self.store.reserve(&folder_key, media.fingerprint) {
                self.stats.duplicate_skipped();
                continue;
            }

            self.extract_reserved(&folder_key, &media, record.date_ms);

            if self.cadence == PersistCadence::PerAttachment {
                self.checkpoint();
            }
        }
    }

    /// Write a reserved attachment. A failed write rolls the reservation
    /// back; a timestamp failure after a successful write keeps it, since
    /// the content is on disk.
    fn extract_reserved(
        &self,
        folder_key: &str,
        media: &crate::extractor::media::DecodedMedia,
        date_ms: Option<i64>,
    ) {
        let folder = match self.writer.ensure_folder(folder_key) {
            Ok((folder, created)) => {
                if created {
                    self.stats.folder_created();
                }
                folder
            }
            Err(error) => {
                self.store.release(folder_key, &media.fingerprint);
                self.report_error(&error);
                return;
            }
        };

        match self.writer.write_media(&folder, &media.filename, &media.bytes, date_ms) {
            Ok(_) => self.stats.file_created(),
            Err(error @ MmsMediaError::Timestamp { .. }) => {
                self.stats.file_created();
                self.report_error(&error);
            }
            Err(error) => {
                self.store.release(folder_key, &media.fingerprint);
                self.report_error(&error);
            }
        }
    }

    /// Flush the fingerprint store at a cadence point. Failure is reported
    /// and counted but never stops extraction; the in-memory store remains
    /// authoritative and a later flush retries.
    fn checkpoint(&self) {
        if let Err(error) = self.store.persist() {
            self.report_error(&error);
        }
    }

    // Failures must stay visible at default verbosity; warning() is gated,
    // error() is not.
    fn report_error(&self, error: &MmsMediaError) {
        self.stats.error(error.to_string());
        self.progress
            .suspend(|| self.formatter.error(&error.user_message()));
    }
}
