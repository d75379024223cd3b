// self
use crate::{_prelude::*, obs::ClaimOutcomeLabel};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedClaim<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedClaim<F> = F;

/// Span wrapping a single claim.
///
/// The `outcome` field starts empty and is filled in by [`ClaimSpan::record_outcome`] once the
/// claim settles, so a single span line carries the client, the call site, and the result.
#[derive(Clone, Debug)]
pub struct ClaimSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl ClaimSpan {
	/// Creates a new span tagged with the requesting client and the call site.
	pub fn new(client: &str, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"keygate.claim",
				client,
				stage,
				outcome = tracing::field::Empty
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (client, stage);

			Self {}
		}
	}

	/// Stamps the settled outcome onto the span.
	pub fn record_outcome(&self, outcome: ClaimOutcomeLabel) {
		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());
		#[cfg(not(feature = "tracing"))]
		let _ = outcome;
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedClaim<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

macro_rules! log_event {
	($level:ident, $($arg:tt)*) => {{
		#[cfg(feature = "tracing")]
		::tracing::$level!($($arg)*);
	}};
}
macro_rules! log_debug {
	($($arg:tt)*) => { $crate::obs::log_event!(debug, $($arg)*) };
}
macro_rules! log_info {
	($($arg:tt)*) => { $crate::obs::log_event!(info, $($arg)*) };
}
macro_rules! log_warn {
	($($arg:tt)*) => { $crate::obs::log_event!(warn, $($arg)*) };
}
pub(crate) use {log_debug, log_event, log_info, log_warn};
