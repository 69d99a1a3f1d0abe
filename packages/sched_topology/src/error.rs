use thiserror::Error;

use crate::UnitSet;

/// Fatal errors that abort a topology discovery attempt.
///
/// Whichever of these occurs, the partially parsed topology is discarded and the system falls
/// back to the register-derived topology. No error is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The root of the description contained a core node. The root may only contain clusters.
    #[error("{path}: cpu-map children should be clusters")]
    CoreUnderRoot {
        /// Path of the offending core node.
        path: String,
    },

    /// A cluster contained both nested clusters and cores.
    #[error("{cluster_path}: non-leaf cluster with core {core_name}")]
    CoreInNonLeafCluster {
        /// Path of the cluster node that has nested clusters.
        cluster_path: String,

        /// Name of the core child that is not allowed there.
        core_name: String,
    },

    /// A core node had thread children and also referred to a unit directly.
    #[error("{path}: core has both threads and a unit")]
    CoreWithThreadsAndUnit {
        /// Path of the offending core node.
        path: String,
    },

    /// A thread node did not resolve to any possible unit.
    #[error("{path}: cannot get unit for thread")]
    UnresolvedThread {
        /// Path of the thread node.
        path: String,
    },

    /// A core without thread children did not resolve to any possible unit.
    #[error("{path}: cannot get unit for leaf core")]
    UnresolvedLeafCore {
        /// Path of the core node.
        path: String,
    },

    /// The description parsed cleanly but did not mention some of the possible units.
    #[error("units {missing} are not described in the topology")]
    IncompleteTopology {
        /// The units that never received a cluster ID.
        missing: UnitSet,
    },
}

/// Broad classification of [`Error`] values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The description is malformed.
    Structural,

    /// A node refers to something that is not a possible unit.
    Resolution,

    /// Some possible unit is missing from the description.
    Completeness,
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CoreUnderRoot { .. }
            | Self::CoreInNonLeafCluster { .. }
            | Self::CoreWithThreadsAndUnit { .. } => ErrorKind::Structural,
            Self::UnresolvedThread { .. } | Self::UnresolvedLeafCore { .. } => {
                ErrorKind::Resolution
            }
            Self::IncompleteTopology { .. } => ErrorKind::Completeness,
        }
    }
}

/// A specialized `Result` type for topology discovery, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
