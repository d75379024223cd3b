// self
use crate::obs::ClaimOutcomeLabel;

/// Records a claim outcome via the global metrics recorder (when enabled).
pub fn record_claim_outcome(outcome: ClaimOutcomeLabel) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("keygate_claim_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records how many keys were added to the pool (when enabled).
pub fn record_keys_generated(count: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("keygate_keys_generated_total").increment(count as u64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = count;
	}
}
