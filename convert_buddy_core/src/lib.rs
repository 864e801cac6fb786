//! Convert Buddy's hard core: a streaming format-conversion engine (DSV,
//! NDJSON, JSON array, record-oriented XML) with bounded memory, exposed to
//! the browser through `wasm-bindgen` (spec §4.6 "Host binding").
//!
//! The wasm surface is a thin shell: option parsing in, bytes out. All
//! conversion logic lives in [`kernel`], [`parsers`], [`encoders`],
//! [`transform`] and [`detect`], none of which know `wasm-bindgen` exists —
//! the same split the teacher crate drew between `csv-core` plumbing and
//! its `CsvSession` wrapper.

pub mod config;
pub mod convert;
pub mod detect;
pub mod encoders;
pub mod error;
pub mod kernel;
pub mod parsers;
pub mod record;
pub mod stats;
pub mod transform;

use js_sys::{Function, Uint8Array};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use wasm_streams::ReadableStream as WasmReadableStream;

use config::KernelOptions;
use error::ConvertError;
use kernel::Kernel;
use stats::Stats;

/// Install better panic messages and, when the host asked for `debug`
/// logging, wire `log` up to the browser console. Call once per page.
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
    #[cfg(target_family = "wasm")]
    let _ = console_log::init_with_level(log::Level::Debug);
}

fn js_error(err: ConvertError) -> JsValue {
    let payload = serde_json::json!({ "tag": err.tag(), "message": err.to_string() });
    to_value(&payload).unwrap_or_else(|_| JsValue::from_str(&err.to_string()))
}

fn parse_options(options: JsValue) -> Result<KernelOptions, JsValue> {
    from_value(options).map_err(|e| JsValue::from_str(&format!("invalid options: {e}")))
}

fn copy_in(chunk: &Uint8Array) -> Vec<u8> {
    let mut data = vec![0u8; chunk.length() as usize];
    chunk.copy_to(&mut data[..]);
    data
}

/// A reusable, incremental conversion instance (spec §6 "Incremental
/// instance"). Mirrors the teacher's `CsvSession`: construct once per
/// conversion, feed it chunks, call `finish` exactly once.
#[wasm_bindgen]
pub struct ConvertSession {
    kernel: Kernel<'static>,
}

#[wasm_bindgen]
impl ConvertSession {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<ConvertSession, JsValue> {
        let options = parse_options(options)?;
        let kernel = Kernel::new(options).map_err(js_error)?;
        Ok(ConvertSession { kernel })
    }

    /// Register a progress callback, invoked with a `stats()`-shaped
    /// snapshot (spec §6 `onProgress`).
    #[wasm_bindgen(js_name = onProgress)]
    pub fn on_progress(&mut self, callback: Function) {
        self.kernel.set_on_progress(Box::new(move |stats: &Stats| {
            if let Ok(value) = to_value(stats) {
                let _ = callback.call1(&JsValue::NULL, &value);
            }
        }));
    }

    #[wasm_bindgen(js_name = pushChunk)]
    pub fn push_chunk(&mut self, chunk: Uint8Array) -> Result<Uint8Array, JsValue> {
        let data = copy_in(&chunk);
        let out = self.kernel.push(&data).map_err(js_error)?;
        Ok(Uint8Array::from(out.as_slice()))
    }

    #[wasm_bindgen]
    pub fn finish(&mut self) -> Result<Uint8Array, JsValue> {
        let out = self.kernel.finish().map_err(js_error)?;
        Ok(Uint8Array::from(out.as_slice()))
    }

    #[wasm_bindgen]
    pub fn abort(&mut self) {
        self.kernel.abort();
    }

    #[wasm_bindgen]
    pub fn pause(&mut self) {
        self.kernel.pause();
    }

    #[wasm_bindgen]
    pub fn resume(&mut self) {
        self.kernel.resume();
    }

    #[wasm_bindgen(js_name = isAborted)]
    pub fn is_aborted(&self) -> bool {
        self.kernel.is_aborted()
    }

    #[wasm_bindgen(js_name = isPaused)]
    pub fn is_paused(&self) -> bool {
        self.kernel.is_paused()
    }

    #[wasm_bindgen]
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_value(&self.kernel.stats()).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

/// One-shot conversion (spec §6 "One-shot conversion"): the whole input is
/// already in memory, so there is no reason to manage a session.
#[wasm_bindgen]
pub fn convert(input: Uint8Array, options: JsValue) -> Result<Uint8Array, JsValue> {
    let options = parse_options(options)?;
    let data = copy_in(&input);
    let out = convert::convert(&data, options).map_err(js_error)?;
    Ok(Uint8Array::from(out.as_slice()))
}

#[wasm_bindgen(js_name = convertToString)]
pub fn convert_to_string(input: Uint8Array, options: JsValue) -> Result<String, JsValue> {
    let options = parse_options(options)?;
    let data = copy_in(&input);
    convert::convert_to_string(&data, options).map_err(js_error)
}

/// Sniff a format from a leading sample of the input (spec §4.5, §6
/// `detectFormat`). `maxBytes`/`maxRecords` default per [`detect::DetectionOptions`]
/// when the host passes `0`.
#[wasm_bindgen(js_name = detectFormat)]
pub fn detect_format_js(sample: Uint8Array, max_bytes: usize, max_records: usize) -> String {
    let data = copy_in(&sample);
    let mut opts = detect::DetectionOptions::default();
    if max_bytes > 0 {
        opts.max_bytes = max_bytes;
    }
    if max_records > 0 {
        opts.max_records = max_records;
    }
    let detected = detect::detect_format(&data, &opts);
    match detected.to_format() {
        Some(format) => serde_json::to_value(format)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string()),
        None => "unknown".to_string(),
    }
}

/// Sniff field names, a DSV delimiter, or an XML record element from a
/// leading sample (spec §6 `detectStructure`).
#[wasm_bindgen(js_name = detectStructure)]
pub fn detect_structure_js(sample: Uint8Array, max_bytes: usize, max_records: usize) -> Result<JsValue, JsValue> {
    let data = copy_in(&sample);
    let mut opts = detect::DetectionOptions::default();
    if max_bytes > 0 {
        opts.max_bytes = max_bytes;
    }
    if max_records > 0 {
        opts.max_records = max_records;
    }
    let structure = detect::detect_structure(&data, None, &opts);
    to_value(&structure).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Pipe a `ReadableStream<Uint8Array>` straight through a fresh session,
/// reporting progress after every chunk (the teacher's `stream_csv`,
/// generalized past CSV).
#[wasm_bindgen(js_name = streamConvert)]
pub fn stream_convert(input: JsValue, options: JsValue, progress_callback: Function) -> Result<js_sys::Promise, JsValue> {
    let options = parse_options(options)?;
    Ok(future_to_promise(async move {
        use futures::StreamExt;

        let mut kernel = Kernel::new(options).map_err(js_error)?;
        let mut input_stream = WasmReadableStream::from_raw(input.into()).into_stream();
        let mut produced: Vec<u8> = Vec::new();

        while let Some(chunk) = input_stream.next().await {
            let chunk = chunk?;
            let view = Uint8Array::new(&chunk);
            let data = copy_in(&view);
            let out = kernel.push(&data).map_err(js_error)?;
            produced.extend_from_slice(&out);
            let snapshot = to_value(&kernel.stats()).unwrap_or(JsValue::NULL);
            progress_callback.call1(&JsValue::NULL, &snapshot)?;
        }

        produced.extend(kernel.finish().map_err(js_error)?);
        Ok(JsValue::from(Uint8Array::from(produced.as_slice())))
    }))
}
