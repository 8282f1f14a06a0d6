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

use arena_common::{
    MULLIGAN_MAX_KEPT_COST, MulliganCard, MulliganRequest, MulliganResponse, TraceToken,
};
use tracing::{debug, info_span};

/// Cards a bot throws back from its opening hand, in hand order.
pub fn mulligan_discards(cards: &[MulliganCard]) -> Vec<MulliganCard> {
    cards
        .iter()
        .filter(|card| card.base_mana_cost > MULLIGAN_MAX_KEPT_COST)
        .cloned()
        .collect()
}

pub fn mulligan(request: &MulliganRequest) -> MulliganResponse {
    let trace = request.trace.clone().unwrap_or_else(TraceToken::generate);
    let span = info_span!(
        "bot.mulligan",
        game_id = %request.game_id,
        player_id = %request.player_id,
        trace_id = %trace,
    );
    let _entered = span.enter();

    let discarded = mulligan_discards(&request.cards);
    debug!(
        offered = request.cards.len(),
        discarded = discarded.len(),
        "bot mulligan decided"
    );
    MulliganResponse { discarded, trace }
}
