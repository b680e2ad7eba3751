//! Sliding time-window buffer for pan/zoom viewers
//!
//! A [`WindowBuffer`] keeps decoded samples around the visible window so
//! panning does not hit the resource on every step. The buffer is a deque of
//! record-aligned chunks; panning fetches one chunk at a time in the direction
//! of motion, and the buffer either grows or slides depending on its width.
//!
//! At most one fetch runs per buffer. Calls that would start a second one
//! return [`LoadOutcome::Busy`]; the running load re-checks the window after
//! every chunk, so a pan that arrived while it was busy is still served.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::config::WindowConfig;
use crate::error::{EdfError, Result};
use crate::reader::EdfReader;
use crate::resource::{ByteRangeResource, Resource};
use crate::types::{BufferRange, DataPoint, DataRequest, EdfHeader, TimeRange, ViewWindow};

/// 浮点比较容差（毫秒）
const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The window did not change
    Unchanged,
    /// The buffer already had enough data around the window
    Sufficient,
    /// At least one chunk was fetched
    Loaded,
    /// Another load was in flight; nothing was fetched
    Busy,
}

/// Samples of every channel for one record-aligned span
#[derive(Debug, Clone)]
pub struct BufferChunk {
    pub span: TimeRange,
    pub channels: Vec<Vec<DataPoint>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Reload(TimeRange),
    Append(TimeRange),
    Prepend(TimeRange),
}

impl Step {
    fn range(&self) -> TimeRange {
        match *self {
            Step::Reload(range) | Step::Append(range) | Step::Prepend(range) => range,
        }
    }
}

struct State {
    window: ViewWindow,
    frequency: Option<f64>,
    viewport: Option<f64>,         // 像素宽度，设置后缩放时重新推导 frequency
    chunks: VecDeque<BufferChunk>,
}

impl State {
    fn buffer_range(&self) -> Option<BufferRange> {
        let first = self.chunks.front()?;
        let last = self.chunks.back()?;
        Some(TimeRange::new(first.span.left, last.span.right))
    }

    /// One point per pixel of the viewport, if one was set
    fn viewport_frequency(&self) -> Option<f64> {
        let pixels = self.viewport?;
        let seconds = self.window.width() / 1000.0;
        (seconds > 0.0 && pixels > 0.0).then(|| pixels / seconds)
    }
}

/// Releases the load flag when dropped, on success and on error alike
struct LoadGuard<'a>(&'a AtomicBool);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Buffered view of one EDF recording
pub struct WindowBuffer<R = Resource> {
    reader: EdfReader<R>,
    header: EdfHeader,
    config: WindowConfig,
    start: f64,
    end: f64,
    state: Mutex<State>,
    loading: AtomicBool,
}

impl<R: ByteRangeResource> WindowBuffer<R> {
    /// Reads the header and loads the initial window at the start of the recording
    pub async fn open(reader: EdfReader<R>, config: WindowConfig) -> Result<Self> {
        let header = reader.read_header().await?.clone();
        let start = header.start_ms();
        let end = header.end_ms();
        if end - start <= EPSILON {
            return Err(EdfError::format("Recording has no data records"));
        }

        let window = TimeRange::new(start, start + config.initial_window_ms);
        let buffer = WindowBuffer {
            reader,
            header,
            config,
            start,
            end,
            state: Mutex::new(State {
                window: TimeRange::default(),
                frequency: None,
                viewport: None,
                chunks: VecDeque::new(),
            }),
            loading: AtomicBool::new(false),
        };

        let window = buffer.clamp(window)?;
        buffer.state.lock().window = window;
        buffer.drive(true).await?;
        Ok(buffer)
    }

    pub fn reader(&self) -> &EdfReader<R> {
        &self.reader
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window(&self) -> ViewWindow {
        self.state.lock().window
    }

    /// Span currently held, `None` before the first load completes
    pub fn buffer_range(&self) -> Option<BufferRange> {
        self.state.lock().buffer_range()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn frequency(&self) -> Option<f64> {
        self.state.lock().frequency
    }

    /// Points per second requested for chunks fetched from now on
    ///
    /// A fixed frequency replaces one derived from the viewport width.
    pub fn set_frequency(&self, frequency: Option<f64>) {
        let mut state = self.state.lock();
        state.frequency = frequency;
        state.viewport = None;
    }

    /// Derives the frequency from the viewport width: one point per pixel
    ///
    /// The width is remembered and the frequency is derived again on every
    /// zoom, so the number of points per window stays constant.
    pub fn set_viewport_width(&self, pixels: f64) {
        if !(pixels > 0.0) {
            return;
        }
        let mut state = self.state.lock();
        state.viewport = Some(pixels);
        if let Some(frequency) = state.viewport_frequency() {
            state.frequency = Some(frequency);
        }
    }

    /// Per-channel samples of the whole buffer, in time order
    ///
    /// Chunks are decimated one by one: each starts with a raw sample and
    /// drops its trailing partial bucket, so the gap at a seam is at most
    /// one bucket width, the same as between two buckets.
    pub fn data(&self) -> Vec<Vec<DataPoint>> {
        let state = self.state.lock();
        let mut data: Vec<Vec<DataPoint>> = vec![Vec::new(); self.header.number_of_signals];
        for chunk in &state.chunks {
            for (channel, points) in data.iter_mut().zip(&chunk.channels) {
                channel.extend_from_slice(points);
            }
        }
        data
    }

    /// Moves the window, fetching whatever the new position needs
    ///
    /// A window of the same width is a pan and is served from the buffer
    /// plus at most a few chunk fetches; a different width discards the
    /// buffer and fetches exactly the new window.
    pub async fn update_window(&self, window: ViewWindow) -> Result<LoadOutcome> {
        let window = self.clamp(window)?;

        let resized = {
            let mut state = self.state.lock();
            if state.window == window {
                return Ok(LoadOutcome::Unchanged);
            }
            let resized = (state.window.width() - window.width()).abs() > EPSILON;
            state.window = window;
            if resized {
                if let Some(frequency) = state.viewport_frequency() {
                    state.frequency = Some(frequency);
                }
            }
            resized
        };

        debug!("window -> [{}, {}] ({})", window.left, window.right, if resized { "zoom" } else { "pan" });
        self.drive(resized).await
    }

    /// Fetches one more chunk if the buffer runs short around the window
    pub async fn check_sufficiency(&self) -> Result<LoadOutcome> {
        self.drive(false).await
    }

    /// Pans left by one window width
    pub async fn move_left(&self) -> Result<LoadOutcome> {
        let window = self.window();
        let width = window.width();
        self.update_window(TimeRange::new(window.left - width, window.right - width)).await
    }

    /// Pans right by one window width
    pub async fn move_right(&self) -> Result<LoadOutcome> {
        let window = self.window();
        let width = window.width();
        self.update_window(TimeRange::new(window.left + width, window.right + width)).await
    }

    /// Keeps the left edge and shows `seconds` of signal
    pub async fn zoom_to(&self, seconds: f64) -> Result<LoadOutcome> {
        let left = self.window().left;
        self.update_window(TimeRange::new(left, left + seconds * 1000.0)).await
    }

    /// Shows the whole recording
    pub async fn show_full(&self) -> Result<LoadOutcome> {
        self.update_window(TimeRange::new(self.start, self.end)).await
    }

    /// Keeps a window inside the recording without changing its width
    fn clamp(&self, window: ViewWindow) -> Result<ViewWindow> {
        if !(window.width() > 0.0) {
            return Err(EdfError::BadInterval {
                from: window.left - self.start,
                till: window.right - self.start,
            });
        }

        let width = window.width().min(self.end - self.start);
        Ok(if window.left < self.start {
            TimeRange::new(self.start, self.start + width)
        } else if window.right > self.end {
            TimeRange::new(self.end - width, self.end)
        } else {
            window
        })
    }

    /// Width the buffer may grow to before it starts sliding
    fn policy_width(&self, window: &ViewWindow) -> f64 {
        (window.width().max(self.config.chunk_width_ms) * self.config.buffer_factor)
            .min(self.end - self.start)
    }

    fn try_begin(&self) -> Option<LoadGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadGuard(&self.loading))
    }

    /// What the buffer needs next for the current window, if anything
    fn plan(&self, state: &State) -> Option<Step> {
        let window = state.window;
        let Some(buffer) = state.buffer_range() else {
            return Some(Step::Reload(window));
        };

        // 窗口与缓冲区不相交（跳转），重新加载
        if window.right <= buffer.left || window.left >= buffer.right {
            return Some(Step::Reload(window));
        }

        let width = window.width();
        let chunk = self.config.chunk_width_ms;

        // 优先向右（阅读方向）扩展
        if buffer.right < window.right + width && buffer.right < self.end - EPSILON {
            return Some(Step::Append(TimeRange::new(buffer.right, (buffer.right + chunk).min(self.end))));
        }
        if buffer.left > window.left - width && buffer.left > self.start + EPSILON {
            return Some(Step::Prepend(TimeRange::new((buffer.left - chunk).max(self.start), buffer.left)));
        }
        None
    }

    /// Runs loads until the window is covered; `reload` forces a fresh buffer first
    async fn drive(&self, mut reload: bool) -> Result<LoadOutcome> {
        let Some(_guard) = self.try_begin() else {
            trace!("load in flight, skipping");
            return Ok(LoadOutcome::Busy);
        };

        let mut outcome = LoadOutcome::Sufficient;
        let mut evicted: Vec<TimeRange> = Vec::new();
        let mut evicted_for = TimeRange::default();
        loop {
            let (step, frequency, window) = {
                let state = self.state.lock();
                let step = if reload { Some(Step::Reload(state.window)) } else { self.plan(&state) };
                (step, state.frequency, state.window)
            };
            reload = false;

            let Some(step) = step else { break };
            // 窗口未变时，不重新读取上一步刚丢弃的数据
            let range = step.range();
            let undoes = window == evicted_for
                && evicted.iter().any(|span| span.left < range.right - EPSILON && range.left < span.right - EPSILON);
            if undoes {
                warn!("{:?} would refetch a chunk evicted for the same window, stopping", step);
                break;
            }
            let chunk = self.fetch(range, frequency).await?;
            evicted = self.apply(step, chunk);
            evicted_for = window;
            outcome = LoadOutcome::Loaded;
        }
        Ok(outcome)
    }

    async fn fetch(&self, range: TimeRange, frequency: Option<f64>) -> Result<BufferChunk> {
        let span = self.header.block_span(range.left - self.start, range.right - self.start)?;
        let channels = self
            .reader
            .get_data(DataRequest { from: span.left, till: span.right, frequency })
            .await?;
        Ok(BufferChunk {
            span: TimeRange::new(self.start + span.left, self.start + span.right),
            channels,
        })
    }

    /// Splices a fetched chunk into the buffer and returns the spans it evicted
    ///
    /// Sliding only evicts chunks lying wholly outside the headroom
    /// `[window.left - width, window.right + width]`.
    fn apply(&self, step: Step, chunk: BufferChunk) -> Vec<TimeRange> {
        let mut state = self.state.lock();
        let policy = self.policy_width(&state.window);
        let width = state.buffer_range().map_or(0.0, |buffer| buffer.width());
        let grow = width <= policy;
        let added = chunk.span.width();
        let window = state.window;
        let keep = TimeRange::new(window.left - window.width(), window.right + window.width());
        let mut evicted = Vec::new();

        match step {
            Step::Reload(_) => {
                state.chunks.clear();
                state.chunks.push_back(chunk);
            }
            Step::Append(_) => {
                state.chunks.push_back(chunk);
                if !grow {
                    let mut dropped = 0.0;
                    while dropped < added && state.chunks.len() > 1 {
                        match state.chunks.front() {
                            Some(old) if old.span.right <= keep.left + EPSILON => {}
                            _ => break,
                        }
                        if let Some(old) = state.chunks.pop_front() {
                            dropped += old.span.width();
                            evicted.push(old.span);
                        }
                    }
                }
            }
            Step::Prepend(_) => {
                state.chunks.push_front(chunk);
                if !grow {
                    let mut dropped = 0.0;
                    while dropped < added && state.chunks.len() > 1 {
                        match state.chunks.back() {
                            Some(old) if old.span.left >= keep.right - EPSILON => {}
                            _ => break,
                        }
                        if let Some(old) = state.chunks.pop_back() {
                            dropped += old.span.width();
                            evicted.push(old.span);
                        }
                    }
                }
            }
        }

        if let Some(buffer) = state.buffer_range() {
            debug!(
                "buffer updated: [{}, {}] in {} chunks ({})",
                buffer.left - self.start,
                buffer.right - self.start,
                state.chunks.len(),
                match step {
                    Step::Reload(_) => "reload",
                    Step::Append(_) if grow => "append",
                    Step::Append(_) => "slide right",
                    Step::Prepend(_) if grow => "prepend",
                    Step::Prepend(_) => "slide left",
                }
            );
        }
        evicted
    }
}
