//! The streaming kernel state machine (spec §4.1): `Fresh → Configured →
//! Streaming → Finished | Aborted | Failed`. Owns the input scratch buffer,
//! the active parser/encoder/transform, and stats; drives the
//! parse→transform→encode loop on every `push` and flushes it on `finish`.

use crate::config::{Format, KernelOptions};
use crate::detect::{detect_format, DetectedFormat, DetectionOptions};
use crate::encoders::dsv::DsvEncoder;
use crate::encoders::json_array::JsonArrayEncoder;
use crate::encoders::ndjson::NdjsonEncoder;
use crate::encoders::xml::XmlEncoder;
use crate::encoders::Encoder;
use crate::error::{ConvertError, ConvertResult};
use crate::parsers::dsv::DsvParser;
use crate::parsers::json_array::JsonArrayParser;
use crate::parsers::ndjson::NdjsonParser;
use crate::parsers::xml::XmlParser;
use crate::parsers::{Parser, Sink};
use crate::record::Record;
use crate::stats::{Stats, Timer};
use crate::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KernelState {
    Fresh,
    Configured,
    Streaming,
    Finished,
    Aborted,
    Failed,
}

/// Input-format resolution, tracked separately from `KernelState` because
/// `auto` needs its own small state machine nested inside `Configured`/
/// `Streaming` (spec §9 "Auto format").
enum InputResolution {
    /// A concrete format was configured; the parser already exists.
    Resolved(Box<dyn Parser>),
    /// `inputFormat: auto`; bytes accumulate in `Kernel::scratch` until
    /// `detectFormat` resolves a format or the buffering cap is reached.
    Detecting,
}

fn build_parser(format: Format, options: &KernelOptions) -> Box<dyn Parser> {
    match format {
        Format::Dsv => Box::new(DsvParser::new(options.dsv_config.clone())),
        Format::Ndjson => Box::new(NdjsonParser::new(options.json_config.clone())),
        Format::Json => Box::new(JsonArrayParser::new(options.json_config.clone())),
        Format::Xml => Box::new(XmlParser::with_detection_cap(
            options.xml_config.clone(),
            options.detection_max_bytes,
        )),
        Format::Auto => unreachable!("auto is resolved before a parser is built"),
    }
}

fn build_encoder(format: Format, options: &KernelOptions) -> Box<dyn Encoder> {
    match format {
        Format::Dsv => Box::new(DsvEncoder::new(options.dsv_config.clone())),
        Format::Ndjson => Box::new(NdjsonEncoder::new()),
        Format::Json => Box::new(JsonArrayEncoder::new()),
        Format::Xml => Box::new(XmlEncoder::new(options.xml_config.clone())),
        Format::Auto => unreachable!("KernelOptions::validate rejects an auto output format"),
    }
}

/// A reusable, incremental conversion instance (spec §6 "Incremental
/// instance"). One kernel handles exactly one conversion from construction
/// to `finish`/`abort`; reuse means constructing a fresh instance, not
/// resetting this one (spec §3 "Lifecycle & ownership" describes buffer
/// *capacity* reuse at the host layer, not kernel reuse across conversions).
pub struct Kernel<'a> {
    options: KernelOptions,
    state: KernelState,
    scratch: Vec<u8>,
    input: InputResolution,
    encoder: Box<dyn Encoder>,
    stats: Stats,
    last_reported_bytes_in: u64,
    paused: bool,
    in_call: bool,
    on_progress: Option<Box<dyn FnMut(&Stats) + 'a>>,
}

impl<'a> Kernel<'a> {
    pub fn new(options: KernelOptions) -> ConvertResult<Self> {
        options.validate()?;
        let encoder = build_encoder(options.output_format, &options);
        let input = if options.input_format.is_auto() {
            InputResolution::Detecting
        } else {
            InputResolution::Resolved(build_parser(options.input_format, &options))
        };
        log::debug!("kernel configured: {:?} -> {:?}", options.input_format, options.output_format);
        Ok(Kernel {
            options,
            state: KernelState::Configured,
            scratch: Vec::new(),
            input,
            encoder,
            stats: Stats::new(),
            last_reported_bytes_in: 0,
            paused: false,
            in_call: false,
            on_progress: None,
        })
    }

    /// Install a progress callback (spec §6 `onProgress`). Invoked at the
    /// end of `push`/`finish` whenever `bytesIn` has advanced by at least
    /// `progressIntervalBytes` since the last call, and unconditionally at
    /// `finish`.
    pub fn set_on_progress(&mut self, cb: Box<dyn FnMut(&Stats) + 'a>) {
        self.on_progress = Some(cb);
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn is_aborted(&self) -> bool {
        self.state == KernelState::Aborted
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Idempotent; marks the kernel terminal with no further side effects.
    pub fn abort(&mut self) {
        self.state = KernelState::Aborted;
    }

    fn guard_entry(&mut self) -> ConvertResult<()> {
        if self.in_call {
            return Err(ConvertError::Reentrancy);
        }
        match self.state {
            KernelState::Aborted => Err(ConvertError::Aborted),
            KernelState::Finished => Err(ConvertError::Finished),
            KernelState::Failed => Err(ConvertError::Aborted),
            _ if self.paused => Err(ConvertError::Paused),
            _ => Ok(()),
        }
    }

    /// Append bytes, drive parse→transform→encode to a quiescent point, and
    /// return whatever output the encoder produced (spec §4.1 `push`).
    pub fn push(&mut self, bytes: &[u8]) -> ConvertResult<Vec<u8>> {
        self.guard_entry()?;
        self.in_call = true;
        self.state = KernelState::Streaming;
        let result = self.push_inner(bytes);
        self.in_call = false;
        if result.is_err() {
            self.state = KernelState::Failed;
        }
        result
    }

    fn push_inner(&mut self, bytes: &[u8]) -> ConvertResult<Vec<u8>> {
        self.stats.bytes_in += bytes.len() as u64;
        self.stats.chunks_in += 1;
        self.scratch.extend_from_slice(bytes);

        // Checked against the newly-extended scratch plus whatever the
        // parser is already holding from a prior call, before draining:
        // catches both a single chunk that alone exceeds the cap and bytes
        // accumulating across calls inside the parser's own partial-record
        // state (an open quote, an unterminated object, ...), which
        // `drain_scratch` would otherwise hide by the time it returns.
        if self.combined_buffered_bytes() > self.options.max_buffer_bytes {
            return Err(ConvertError::BufferOverflow {
                limit: self.options.max_buffer_bytes,
            });
        }

        let mut out = Vec::new();
        self.resolve_auto_if_needed(false)?;
        self.drain_scratch(&mut out)?;
        self.note_buffer_state();
        if self.stats.current_partial_size > self.options.max_buffer_bytes {
            return Err(ConvertError::BufferOverflow {
                limit: self.options.max_buffer_bytes,
            });
        }
        self.maybe_report_progress();
        Ok(out)
    }

    fn combined_buffered_bytes(&self) -> usize {
        let parser_pending = match &self.input {
            InputResolution::Resolved(parser) => parser.pending_bytes(),
            InputResolution::Detecting => 0,
        };
        self.scratch.len() + parser_pending
    }

    /// `finish`: flush the parser (trailing partial record or truncation
    /// error), then the encoder's closing framing.
    pub fn finish(&mut self) -> ConvertResult<Vec<u8>> {
        self.guard_entry()?;
        self.in_call = true;
        let result = self.finish_inner();
        self.in_call = false;
        match &result {
            Ok(_) => self.state = KernelState::Finished,
            Err(_) => self.state = KernelState::Failed,
        }
        result
    }

    fn finish_inner(&mut self) -> ConvertResult<Vec<u8>> {
        let mut out = Vec::new();
        self.resolve_auto_if_needed(true)?;
        self.drain_scratch(&mut out)?;

        match &mut self.input {
            InputResolution::Resolved(parser) => {
                let options = &self.options;
                let stats = &mut self.stats;
                let parse_timer = Timer::start(options.profile);
                let mut pending: Vec<Record> = Vec::new();
                {
                    let mut sink: Box<Sink> = Box::new(|r| {
                        pending.push(r);
                        Ok(())
                    });
                    let mut tail = std::mem::take(&mut self.scratch);
                    parser.finish(&mut tail, &mut *sink)?;
                    self.scratch = tail;
                }
                stats.parse_time_ms += parse_timer.stop();
                encode_records(pending, &options.transform, &mut *self.encoder, stats, &mut out, options.profile)?;
            }
            InputResolution::Detecting => {
                // No bytes were ever pushed; nothing to flush.
            }
        }

        self.encoder.finish(&mut out)?;
        self.stats.bytes_out += out.len() as u64;
        self.stats.chunks_out += 1;
        self.note_buffer_state();
        self.report_progress_unconditionally();
        Ok(out)
    }

    /// If `inputFormat: auto`, buffer bytes in `scratch` until
    /// `detectFormat` resolves a concrete format (or the cap is hit, at
    /// which point DSV is the fallback, per spec §9's "otherwise"
    /// fallthrough resolved at the buffering cap). Once resolved, build the
    /// real parser and leave the buffered bytes in `scratch` to be consumed
    /// by the normal drain path below.
    fn resolve_auto_if_needed(&mut self, at_finish: bool) -> ConvertResult<()> {
        let InputResolution::Detecting = &self.input else {
            return Ok(());
        };

        let opts = DetectionOptions {
            max_bytes: self.options.detection_max_bytes,
            max_records: 50,
        };
        let reached_cap = self.scratch.len() >= opts.max_bytes;
        let detected = detect_format(&self.scratch, &opts);
        let resolved = match detected {
            DetectedFormat::Unknown if !reached_cap && !at_finish => None,
            DetectedFormat::Unknown => Some(Format::Dsv),
            other => other.to_format(),
        };

        if let Some(format) = resolved {
            log::debug!("auto format resolved to {format:?}");
            self.stats.resolved_format = Some(format);
            self.input = InputResolution::Resolved(build_parser(format, &self.options));
        }
        Ok(())
    }

    /// Run whatever parser is active over `scratch`, transform and encode
    /// every emitted record, appending encoder output to `out`.
    fn drain_scratch(&mut self, out: &mut Vec<u8>) -> ConvertResult<()> {
        let InputResolution::Resolved(parser) = &mut self.input else {
            return Ok(());
        };

        let parse_timer = Timer::start(self.options.profile);
        let mut pending: Vec<Record> = Vec::new();
        {
            let mut sink: Box<Sink> = Box::new(|r| {
                pending.push(r);
                Ok(())
            });
            parser.feed(&mut self.scratch, &mut *sink)?;
        }
        self.stats.parse_time_ms += parse_timer.stop();

        encode_records(
            pending,
            &self.options.transform,
            &mut *self.encoder,
            &mut self.stats,
            out,
            self.options.profile,
        )?;
        self.stats.bytes_out += out.len() as u64;
        if !out.is_empty() {
            self.stats.chunks_out += 1;
        }
        Ok(())
    }

    fn note_buffer_state(&mut self) {
        let current = self.combined_buffered_bytes();
        self.stats.note_buffer_size(current);
    }

    fn maybe_report_progress(&mut self) {
        let interval = self.options.progress_interval_bytes;
        if interval == 0 {
            return;
        }
        if self.stats.bytes_in.saturating_sub(self.last_reported_bytes_in) >= interval {
            self.last_reported_bytes_in = self.stats.bytes_in;
            if let Some(cb) = &mut self.on_progress {
                cb(&self.stats);
            }
        }
    }

    fn report_progress_unconditionally(&mut self) {
        self.last_reported_bytes_in = self.stats.bytes_in;
        if let Some(cb) = &mut self.on_progress {
            cb(&self.stats);
        }
    }
}

/// Run each parsed record through the configured transform (if any) and
/// then the active encoder, honoring `recordsFiltered` vs `recordsProcessed`
/// bookkeeping (spec §3 invariant 2, §4.4).
fn encode_records(
    records: Vec<Record>,
    transform: &Option<transform::TransformSpec>,
    encoder: &mut dyn Encoder,
    stats: &mut Stats,
    out: &mut Vec<u8>,
    profile: bool,
) -> ConvertResult<()> {
    for record in records {
        let transform_timer = Timer::start(profile);
        let kept = match transform {
            Some(spec) => transform::apply(spec, record)?,
            None => Some(record),
        };
        stats.transform_time_ms += transform_timer.stop();

        match kept {
            Some(record) => {
                let write_timer = Timer::start(profile);
                encoder.write_record(&record, out)?;
                stats.write_time_ms += write_timer.stop();
                stats.records_processed += 1;
            }
            None => {
                stats.records_filtered += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DsvConfig, Format, JsonConfig};

    fn basic_options(input: Format, output: Format) -> KernelOptions {
        KernelOptions {
            input_format: input,
            output_format: output,
            dsv_config: DsvConfig::default(),
            xml_config: Default::default(),
            json_config: JsonConfig::default(),
            transform: None,
            chunk_target_bytes: 1024,
            max_memory_mb: 512,
            max_buffer_bytes: 64 * 1024 * 1024,
            progress_interval_bytes: 0,
            profile: false,
            debug: false,
            detection_max_bytes: 256 * 1024,
        }
    }

    #[test]
    fn csv_to_json_basic_scenario() {
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Json)).unwrap();
        let mut out = kernel.push(b"name,age\nAda,36\nLinus,54\n").unwrap();
        out.extend(kernel.finish().unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"[{"name":"Ada","age":"36"},{"name":"Linus","age":"54"}]"#
        );
    }

    #[test]
    fn csv_to_ndjson_chunked_matches_one_shot() {
        let mut out = Vec::new();
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Ndjson)).unwrap();
        for chunk in [&b"name,age\n"[..], b"Ada,", b"36\nLinus,54\n"] {
            out.extend(kernel.push(chunk).unwrap());
        }
        out.extend(kernel.finish().unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"name\":\"Ada\",\"age\":\"36\"}\n{\"name\":\"Linus\",\"age\":\"54\"}\n"
        );
    }

    #[test]
    fn abort_is_terminal() {
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Ndjson)).unwrap();
        kernel.push(b"a,b\n1,2\n").unwrap();
        kernel.abort();
        assert!(kernel.is_aborted());
        assert!(matches!(kernel.push(b"3,4\n"), Err(ConvertError::Aborted)));
        assert!(matches!(kernel.finish(), Err(ConvertError::Aborted)));
    }

    #[test]
    fn pause_rejects_push_until_resumed() {
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Ndjson)).unwrap();
        kernel.pause();
        assert!(matches!(kernel.push(b"a,b\n"), Err(ConvertError::Paused)));
        kernel.resume();
        assert!(kernel.push(b"a,b\n1,2\n").is_ok());
    }

    #[test]
    fn finish_after_finish_errors() {
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Ndjson)).unwrap();
        kernel.push(b"a,b\n1,2\n").unwrap();
        kernel.finish().unwrap();
        assert!(matches!(kernel.finish(), Err(ConvertError::Finished)));
    }

    #[test]
    fn auto_input_format_detects_dsv() {
        let mut kernel = Kernel::new(basic_options(Format::Auto, Format::Json)).unwrap();
        let mut out = kernel.push(b"name,age\nAda,36\n").unwrap();
        out.extend(kernel.finish().unwrap());
        assert_eq!(kernel.stats().resolved_format, Some(Format::Dsv));
        assert_eq!(String::from_utf8(out).unwrap(), r#"[{"name":"Ada","age":"36"}]"#);
    }

    #[test]
    fn stats_track_records_processed_after_abort() {
        let mut kernel = Kernel::new(basic_options(Format::Dsv, Format::Ndjson)).unwrap();
        kernel.push(b"a,b\n1,2\n").unwrap();
        kernel.abort();
        assert_eq!(kernel.stats().records_processed, 1);
    }

    #[test]
    fn buffer_overflow_counts_bytes_held_inside_the_parser() {
        let mut opts = basic_options(Format::Dsv, Format::Ndjson);
        opts.max_buffer_bytes = 20;
        let mut kernel = Kernel::new(opts).unwrap();

        // An open quote with no closing quote yet: the bytes live in the
        // parser's field buffer, not in `scratch`, once `push` returns.
        kernel.push(b"\"aaaaaaaaaaa").unwrap();
        assert!(matches!(
            kernel.push(b"bbbbbbbbbbb"),
            Err(ConvertError::BufferOverflow { limit: 20 })
        ));
    }

    #[test]
    fn buffer_overflow_on_a_single_oversize_push() {
        let mut opts = basic_options(Format::Dsv, Format::Ndjson);
        opts.max_buffer_bytes = 4;
        let mut kernel = Kernel::new(opts).unwrap();
        assert!(matches!(
            kernel.push(b"name,age\n"),
            Err(ConvertError::BufferOverflow { limit: 4 })
        ));
    }
}
