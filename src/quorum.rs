//! Quorum membership validation for dispersal requests.

use thiserror::Error;

/// Identifier naming a validator quorum.
pub type QuorumId = u8;

/// Errors raised when a request names quorums outside its entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuorumError {
    #[error("no quorum numbers provided")]
    /// The request carried an empty quorum list.
    Empty,
    #[error("provided quorum number {0} not allowed")]
    /// The request named a quorum outside the allowed set.
    NotAllowed(QuorumId),
}

/// Checks every requested quorum against the allowed set.
///
/// Fails on an empty request, and otherwise reports the first requested
/// quorum missing from `allowed`. The order of `requested` decides which
/// offender is named, so the error is stable across implementations.
pub fn check_quorums(requested: &[QuorumId], allowed: &[QuorumId]) -> Result<(), QuorumError> {
    if requested.is_empty() {
        return Err(QuorumError::Empty);
    }
    for &quorum in requested {
        if !allowed.contains(&quorum) {
            return Err(QuorumError::NotAllowed(quorum));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_of_allowed_passes() {
        assert_eq!(check_quorums(&[0, 1], &[0, 1, 2]), Ok(()));
    }

    #[test]
    fn empty_request_is_rejected() {
        let err = check_quorums(&[], &[0, 1]).unwrap_err();
        assert_eq!(err, QuorumError::Empty);
        assert_eq!(err.to_string(), "no quorum numbers provided");
    }

    #[test]
    fn out_of_set_quorum_is_named() {
        let err = check_quorums(&[0, 2], &[0, 1]).unwrap_err();
        assert_eq!(err, QuorumError::NotAllowed(2));
        assert_eq!(err.to_string(), "provided quorum number 2 not allowed");
    }

    #[test]
    fn empty_allowed_set_rejects_everything() {
        assert_eq!(check_quorums(&[0], &[]), Err(QuorumError::NotAllowed(0)));
    }

    #[test]
    fn first_offender_is_reported() {
        assert_eq!(
            check_quorums(&[2, 3, 4], &[0, 1]),
            Err(QuorumError::NotAllowed(2)),
        );
    }
}
