// Copyright (C) Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

use async_backing_subsystem_util::metrics::{
	self,
	prometheus::{self, Gauge, GaugeVec, Opts, U64},
};

type HistogramTimer = metrics::prometheus::prometheus::HistogramTimer;

#[derive(Clone)]
pub(crate) struct MetricsInner {
	time_active_leaves_update: prometheus::Histogram,
	time_introduce_seconded_candidate: prometheus::Histogram,
	time_candidate_backed: prometheus::Histogram,
	time_hypothetical_membership: prometheus::Histogram,
	candidate_count: GaugeVec<U64>,
	candidate_count_in_implicit_view: Gauge<U64>,
	leaves_count: GaugeVec<U64>,
}

/// Prospective parachains metrics.
#[derive(Default, Clone)]
pub struct Metrics(pub(crate) Option<MetricsInner>);

impl Metrics {
	/// Provide a timer for handling `ActiveLeavesUpdate` which observes on drop.
	pub fn time_handle_active_leaves_update(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.time_active_leaves_update.start_timer())
	}

	/// Provide a timer for handling `IntroduceSecondedCandidate` which observes on drop.
	pub fn time_introduce_seconded_candidate(&self) -> Option<HistogramTimer> {
		self.0
			.as_ref()
			.map(|metrics| metrics.time_introduce_seconded_candidate.start_timer())
	}

	/// Provide a timer for handling `CandidateBacked` which observes on drop.
	pub fn time_candidate_backed(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.time_candidate_backed.start_timer())
	}

	/// Provide a timer for handling `GetHypotheticalMembership` which observes on drop.
	pub fn time_hypothetical_membership_request(&self) -> Option<HistogramTimer> {
		self.0
			.as_ref()
			.map(|metrics| metrics.time_hypothetical_membership.start_timer())
	}

	/// Record number of candidates across all fragment chains of the active leaves. First param
	/// is the connected candidates count, second param is the unconnected candidates count.
	pub fn record_candidate_count(&self, connected_count: u64, unconnected_count: u64) {
		if let Some(metrics) = &self.0 {
			metrics.candidate_count.with_label_values(&["connected"]).set(connected_count);
			metrics.candidate_count.with_label_values(&["unconnected"]).set(unconnected_count);
		}
	}

	/// Record the number of candidates held by relay parents which are no longer active leaves.
	pub fn record_candidate_count_in_implicit_view(&self, count: u64) {
		if let Some(metrics) = &self.0 {
			metrics.candidate_count_in_implicit_view.set(count);
		}
	}

	/// Record the number of active and inactive leaves.
	pub fn record_leaves_count(&self, active_count: u64, inactive_count: u64) {
		if let Some(metrics) = &self.0 {
			metrics.leaves_count.with_label_values(&["active"]).set(active_count);
			metrics.leaves_count.with_label_values(&["inactive"]).set(inactive_count);
		}
	}
}

impl metrics::Metrics for Metrics {
	fn try_register(registry: &prometheus::Registry) -> Result<Self, prometheus::PrometheusError> {
		let metrics = MetricsInner {
			time_active_leaves_update: prometheus::register(
				prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
					"async_backing_prospective_parachains_time_active_leaves_update",
					"Time spent handling an active leaves update",
				))?,
				registry,
			)?,
			time_introduce_seconded_candidate: prometheus::register(
				prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
					"async_backing_prospective_parachains_time_introduce_seconded_candidate",
					"Time spent introducing a seconded candidate",
				))?,
				registry,
			)?,
			time_candidate_backed: prometheus::register(
				prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
					"async_backing_prospective_parachains_time_candidate_backed",
					"Time spent marking a candidate as backed",
				))?,
				registry,
			)?,
			time_hypothetical_membership: prometheus::register(
				prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
					"async_backing_prospective_parachains_time_hypothetical_membership",
					"Time spent responding to a hypothetical membership request",
				))?,
				registry,
			)?,
			candidate_count: prometheus::register(
				GaugeVec::new(
					Opts::new(
						"async_backing_prospective_parachains_candidate_count",
						"Number of candidates present across the fragment chains of the active leaves, split by connected and unconnected",
					),
					&["type"],
				)?,
				registry,
			)?,
			candidate_count_in_implicit_view: prometheus::register(
				Gauge::new(
					"async_backing_prospective_parachains_candidate_count_in_implicit_view",
					"Number of candidates present across the fragment chains of relay parents which are not active leaves",
				)?,
				registry,
			)?,
			leaves_count: prometheus::register(
				GaugeVec::new(
					Opts::new(
						"async_backing_prospective_parachains_leaves_count",
						"Number of relay parents with fragment chains, split by active and inactive leaves",
					),
					&["type"],
				)?,
				registry,
			)?,
		};
		Ok(Metrics(Some(metrics)))
	}
}
