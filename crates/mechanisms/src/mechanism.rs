//! Closed set of the mechanisms a private GNN pipeline runs.

use gnn_privacy_accounting::NoisyMechanism;

use crate::gnn_sgd::GnnBasedNoisySgd;
use crate::noisy_sgd::NoisySgd;
use crate::pma::Pma;
use crate::topm::TopMFilter;

/// Any concrete mechanism, so heterogeneous pipelines compose in one group.
#[derive(Clone, Debug, PartialEq)]
pub enum Mechanism {
    /// Multi-hop aggregation perturbation.
    Pma(Pma),
    /// DP-SGD on independent examples.
    NoisySgd(NoisySgd),
    /// Node-level DP-SGD for message passing.
    GnnNoisySgd(GnnBasedNoisySgd),
    /// Graph structure perturbation.
    TopMFilter(TopMFilter),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Mechanism::Pma($m) => $body,
            Mechanism::NoisySgd($m) => $body,
            Mechanism::GnnNoisySgd($m) => $body,
            Mechanism::TopMFilter($m) => $body,
        }
    };
}

impl Mechanism {
    /// The PMA inside, if any.
    pub fn as_pma(&self) -> Option<&Pma> {
        match self {
            Mechanism::Pma(m) => Some(m),
            _ => None,
        }
    }

    /// The plain DP-SGD inside, if any.
    pub fn as_noisy_sgd(&self) -> Option<&NoisySgd> {
        match self {
            Mechanism::NoisySgd(m) => Some(m),
            _ => None,
        }
    }

    /// The node-level DP-SGD inside, if any.
    pub fn as_gnn_sgd(&self) -> Option<&GnnBasedNoisySgd> {
        match self {
            Mechanism::GnnNoisySgd(m) => Some(m),
            _ => None,
        }
    }

    /// The graph filter inside, if any.
    pub fn as_topm(&self) -> Option<&TopMFilter> {
        match self {
            Mechanism::TopMFilter(m) => Some(m),
            _ => None,
        }
    }
}

impl NoisyMechanism for Mechanism {
    fn name(&self) -> &str {
        dispatch!(self, m => m.name())
    }

    fn noise_scale(&self) -> f64 {
        dispatch!(self, m => m.noise_scale())
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        dispatch!(self, m => m.set_noise_scale(noise_scale))
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        dispatch!(self, m => m.rdp(orders))
    }
}

impl From<Pma> for Mechanism {
    fn from(m: Pma) -> Self {
        Mechanism::Pma(m)
    }
}

impl From<NoisySgd> for Mechanism {
    fn from(m: NoisySgd) -> Self {
        Mechanism::NoisySgd(m)
    }
}

impl From<GnnBasedNoisySgd> for Mechanism {
    fn from(m: GnnBasedNoisySgd) -> Self {
        Mechanism::GnnNoisySgd(m)
    }
}

impl From<TopMFilter> for Mechanism {
    fn from(m: TopMFilter) -> Self {
        Mechanism::TopMFilter(m)
    }
}
