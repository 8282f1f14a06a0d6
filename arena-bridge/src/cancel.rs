// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use arena_common::CancelReason;
use tokio::sync::watch;

/// Cancellation scope of one match. The first reason wins.
#[derive(Clone)]
pub struct MatchCancellation {
    sender: Arc<watch::Sender<Option<CancelReason>>>,
}

impl Default for MatchCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchCancellation {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns false if the match was already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.sender.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<Option<CancelReason>>,
}

impl CancelToken {
    pub fn reason(&self) -> Option<CancelReason> {
        *self.receiver.borrow()
    }

    /// Resolves once the match is cancelled. Never resolves if the owning
    /// scope is dropped without cancelling.
    pub async fn cancelled(&mut self) -> CancelReason {
        loop {
            if let Some(reason) = *self.receiver.borrow_and_update() {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_observes_cancel_issued_after_subscribe() {
        let scope = MatchCancellation::new();
        let mut token = scope.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scope.cancel(CancelReason::Forfeit));

        assert_eq!(waiter.await.unwrap(), CancelReason::Forfeit);
    }

    #[tokio::test]
    async fn token_created_after_cancel_resolves_immediately() {
        let scope = MatchCancellation::new();
        scope.cancel(CancelReason::MatchEnded);
        let mut token = scope.token();
        assert_eq!(token.cancelled().await, CancelReason::MatchEnded);
    }

    #[test]
    fn first_reason_wins() {
        let scope = MatchCancellation::new();
        assert!(scope.cancel(CancelReason::ServerDrain));
        assert!(!scope.cancel(CancelReason::Requested));
        assert_eq!(scope.reason(), Some(CancelReason::ServerDrain));
    }

    #[tokio::test]
    async fn dropped_scope_never_fires() {
        let scope = MatchCancellation::new();
        let mut token = scope.token();
        drop(scope);

        let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err());
    }
}
