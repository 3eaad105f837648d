//! Admin subcommands.

use std::io::Write;
use std::sync::Arc;

use clap::Subcommand;
use homestead_claimant::{
    Claimant, ClaimSetting, ClaimantKind, ClaimantRef, Outcome, Permission, Rank, Rejection,
};
use uuid::Uuid;

use crate::error::AdminError;
use crate::session::Session;

/// What the admin tool should do.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every town with its owner, roster size and claimed columns.
    Towns,
    /// Show a player's or town's grants, permission requirements and settings.
    Show {
        /// Player or town id.
        id: Uuid,
    },
    /// Found a town owned by `founder`.
    FoundTown {
        /// Player who will own the town.
        founder: Uuid,
        /// Town name.
        name: String,
    },
    /// Disband a town and release all of its land.
    Disband {
        /// Town owner, or the server identity.
        actor: Uuid,
        /// Town name (case-insensitive).
        name: String,
    },
    /// Set the rank `target` holds on a claimant's land.
    Grant {
        /// Player or town whose land is affected.
        claimant: Uuid,
        /// Identity receiving the rank.
        target: Uuid,
        /// enemy, passive, ally, owner, or none to revoke.
        rank: String,
    },
}

/// Parses a rank argument. `none` clears the grant.
pub fn parse_rank(arg: &str) -> Result<Option<Rank>, AdminError> {
    if arg.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Rank::from_name(arg)
        .map(Some)
        .ok_or_else(|| AdminError::UnknownRank(arg.to_string()))
}

/// Runs `command` against `session`, writing a report to `out`.
pub fn execute(session: &Session, command: &Command, out: &mut impl Write) -> Result<(), AdminError> {
    match command {
        Command::Towns => list_towns(session, out),
        Command::Show { id } => show(session, *id, out),
        Command::FoundTown { founder, name } => {
            let town = session.land().registry().make_town_claim(*founder, name)?;
            writeln!(out, "founded {} ({})", town.name(), town.id())?;
            Ok(())
        }
        Command::Disband { actor, name } => {
            let registry = session.land().registry();
            let town = registry
                .get_town_claim(name)
                .ok_or_else(|| Rejection::UnknownTown(name.clone()))?;
            let disbanded = session.land().disband_town(*actor, town.id())?;
            writeln!(
                out,
                "disbanded {} ({}), {} member(s) released",
                disbanded.name,
                disbanded.id,
                disbanded.members.len()
            )?;
            Ok(())
        }
        Command::Grant {
            claimant,
            target,
            rank,
        } => {
            let rank = parse_rank(rank)?;
            let claimant = claimant_for(session, *claimant);
            let outcome = claimant.update_friend(*target, rank)?;
            let label = rank.map_or("none", Rank::name);
            match outcome {
                Outcome::Applied => writeln!(out, "{target} now holds {label} on {}", claimant.id())?,
                Outcome::Unchanged => writeln!(out, "unchanged")?,
            }
            Ok(())
        }
    }
}

/// Known towns win; any other id is treated as a player.
fn claimant_for(session: &Session, id: Uuid) -> Arc<Claimant> {
    let registry = session.land().registry();
    match registry.get_town(id) {
        Some(town) => Arc::clone(town.claimant()),
        None => Arc::clone(registry.get_player_claim(id).claimant()),
    }
}

fn list_towns(session: &Session, out: &mut impl Write) -> Result<(), AdminError> {
    let towns = session.land().registry().town_caches();
    if towns.is_empty() {
        writeln!(out, "no towns")?;
        return Ok(());
    }
    for town in towns {
        let columns = session.land().claimed_columns(ClaimantRef::town(town.id()));
        writeln!(
            out,
            "{}\t{}\towner {}\t{} member(s)\t{columns} column(s)",
            town.name(),
            town.id(),
            town.owner(),
            town.member_count()
        )?;
    }
    Ok(())
}

fn show(session: &Session, id: Uuid, out: &mut impl Write) -> Result<(), AdminError> {
    let registry = session.land().registry();
    let claimant = claimant_for(session, id);
    let kind = match claimant.kind() {
        ClaimantKind::Player => "player",
        ClaimantKind::Town => "town",
    };
    writeln!(out, "{kind} {id} {:?}", claimant.name())?;

    match claimant.kind() {
        ClaimantKind::Player => match registry.town_of(id) {
            Some(town) => writeln!(out, "town: {} ({})", town.name(), town.id())?,
            None => writeln!(out, "town: none")?,
        },
        ClaimantKind::Town => {
            writeln!(out, "members:")?;
            for (member, rank) in claimant.members() {
                writeln!(out, "  {member} {rank}")?;
            }
        }
    }

    writeln!(out, "friends:")?;
    for (friend, rank) in claimant.friends() {
        writeln!(out, "  {friend} {rank}")?;
    }
    writeln!(out, "permissions:")?;
    for permission in Permission::ALL {
        writeln!(
            out,
            "  {permission:?} requires {}",
            claimant.permission_requirement(permission)
        )?;
    }
    writeln!(out, "settings:")?;
    for setting in ClaimSetting::ALL {
        writeln!(out, "  {setting:?} = {}", claimant.setting(setting))?;
    }
    writeln!(
        out,
        "claimed columns: {}",
        session.land().claimed_columns(claimant.reference())
    )?;
    Ok(())
}
