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

//! What the bridge does when a decision provider fails.

use arena_common::{ActionRequest, ActionResponse, GameAction, Resolution, TraceToken};
use tracing::{error, info};

use crate::error::{BridgeError, DecisionFault};

/// First end-turn option, else the first option. Relies on the caller's ordering.
pub fn fallback_index(actions: &[GameAction]) -> usize {
    actions
        .iter()
        .position(GameAction::is_end_turn)
        .unwrap_or(0)
}

/// Cancellation is re-raised. Every other fault is logged and replaced by the
/// fallback action so the match keeps moving.
pub fn recover(
    fault: &DecisionFault,
    request: &ActionRequest,
    trace: TraceToken,
) -> Result<ActionResponse, BridgeError> {
    if let DecisionFault::Cancelled(reason) = fault {
        info!(
            game_id = %request.game_id,
            player_id = %request.player_id,
            trace_id = %trace,
            reason = %reason,
            "decision cancelled"
        );
        return Err(BridgeError::Cancelled {
            game_id: request.game_id.clone(),
            reason: *reason,
        });
    }

    let index = fallback_index(&request.legal_actions);
    error!(
        game_id = %request.game_id,
        player_id = %request.player_id,
        trace_id = %trace,
        fault = %fault,
        fallback_index = index,
        "decision failed; substituting fallback action"
    );
    ActionResponse::pick(request, index, Resolution::Fallback, trace).ok_or_else(|| {
        BridgeError::NoLegalActions {
            game_id: request.game_id.clone(),
        }
    })
}
