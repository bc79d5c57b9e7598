use std::collections::HashSet;

use rusqlite::{
    params, params_from_iter, Connection, Params, Row, Transaction, TransactionBehavior,
};
use tracing::debug;

use canopy_types::fields::fields_from_json;
use canopy_types::{Block, Container, InsertAt};

use super::decode_error;
use crate::clock::{now_ms, VersionClock};
use crate::error::{StoreError, StoreResult};

const BLOCK_COLUMNS: &str =
    "id, parent_id, root_id, type, modified_by, fields, create_at, update_at, delete_at, insert_at";

/// Parent ids bound per `IN (...)` query while walking a subtree level.
const MAX_IN_PARAMS: usize = 500;

fn read_block(row: &Row<'_>) -> StoreResult<Block> {
    let fields: String = row.get(5)?;
    Ok(Block {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        root_id: row.get(2)?,
        block_type: row.get(3)?,
        modified_by: row.get(4)?,
        fields: fields_from_json(&fields).map_err(decode_error)?,
        create_at: row.get(6)?,
        update_at: row.get(7)?,
        delete_at: row.get(8)?,
        insert_at: InsertAt::from_raw(row.get(9)?),
    })
}

/// Run a block query. A row that fails to scan aborts the whole query.
fn query_blocks<P: Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<Block>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params)?;
    let mut blocks = Vec::new();
    while let Some(row) = rows.next()? {
        blocks.push(read_block(row)?);
    }
    Ok(blocks)
}

/// Latest live version of a block.
fn live(conn: &Connection, container: &Container, block_id: &str) -> StoreResult<Option<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0 AND id = ?2"
    );
    Ok(query_blocks(conn, &sql, params![container.workspace_id, block_id])?
        .into_iter()
        .next())
}

pub(super) fn require_live(
    conn: &Connection,
    container: &Container,
    block_id: &str,
) -> StoreResult<Block> {
    live(conn, container, block_id)?.ok_or_else(|| StoreError::not_found("block", block_id))
}

/// Issue a version newer than every stored version of `block_id`.
///
/// Other connections may have written the block since our clock was seeded,
/// so the stored maximum is observed first. Callers hold a write
/// transaction, which keeps that maximum stable until their row is in.
fn next_version(
    conn: &Connection,
    clock: &VersionClock,
    container: &Container,
    block_id: &str,
) -> StoreResult<InsertAt> {
    let stored: Option<i64> = conn
        .prepare_cached("SELECT MAX(insert_at) FROM blocks WHERE container_id = ?1 AND id = ?2")?
        .query_row(params![container.workspace_id, block_id], |row| row.get(0))?;
    if let Some(raw) = stored {
        clock.observe(InsertAt::from_raw(raw));
    }
    Ok(clock.tick())
}

pub(super) fn insert(
    conn: &Connection,
    clock: &VersionClock,
    container: &Container,
    block: &Block,
) -> StoreResult<()> {
    let fields = block.fields_json()?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let now = now_ms();
    let create_at = if block.create_at != 0 {
        block.create_at
    } else {
        live(&tx, container, &block.id)?.map_or(now, |current| current.create_at)
    };
    let insert_at = next_version(&tx, clock, container, &block.id)?;

    tx.prepare_cached(
        "INSERT INTO blocks
            (container_id, id, parent_id, root_id, type, modified_by, fields,
             create_at, update_at, delete_at, insert_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
    )?
    .execute(params![
        container.workspace_id,
        block.id,
        block.parent_id,
        block.root_id,
        block.block_type,
        block.modified_by,
        fields,
        create_at,
        now,
        insert_at.as_raw(),
    ])?;
    tx.commit()?;

    debug!(container = %container, id = %block.id, %insert_at, "block inserted");
    Ok(())
}

/// Append a deletion marker copied from the live version, if there is one.
pub(super) fn delete(
    conn: &Connection,
    clock: &VersionClock,
    container: &Container,
    block_id: &str,
    modified_by: &str,
) -> StoreResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let now = now_ms();
    let insert_at = next_version(&tx, clock, container, block_id)?;

    let written = tx
        .prepare_cached(
            "INSERT INTO blocks
                (container_id, id, parent_id, root_id, type, modified_by, fields,
                 create_at, update_at, delete_at, insert_at)
             SELECT container_id, id, parent_id, root_id, type, ?3, fields,
                    create_at, ?4, ?4, ?5
             FROM blocks_current
             WHERE container_id = ?1 AND id = ?2 AND delete_at = 0",
        )?
        .execute(params![
            container.workspace_id,
            block_id,
            modified_by,
            now,
            insert_at.as_raw(),
        ])?;
    tx.commit()?;

    if written == 0 {
        debug!(container = %container, id = %block_id, "delete of missing block ignored");
    } else {
        debug!(container = %container, id = %block_id, %insert_at, "block deleted");
    }
    Ok(())
}

pub(super) fn all(conn: &Connection, container: &Container) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0"
    );
    query_blocks(conn, &sql, params![container.workspace_id])
}

pub(super) fn with_parent_and_type(
    conn: &Connection,
    container: &Container,
    parent_id: &str,
    block_type: &str,
) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0 AND parent_id = ?2 AND type = ?3"
    );
    query_blocks(conn, &sql, params![container.workspace_id, parent_id, block_type])
}

pub(super) fn with_parent(
    conn: &Connection,
    container: &Container,
    parent_id: &str,
) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0 AND parent_id = ?2"
    );
    query_blocks(conn, &sql, params![container.workspace_id, parent_id])
}

pub(super) fn with_type(
    conn: &Connection,
    container: &Container,
    block_type: &str,
) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0 AND type = ?2"
    );
    query_blocks(conn, &sql, params![container.workspace_id, block_type])
}

pub(super) fn with_root_id(
    conn: &Connection,
    container: &Container,
    root_id: &str,
) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks_current
         WHERE container_id = ?1 AND delete_at = 0 AND root_id = ?2"
    );
    query_blocks(conn, &sql, params![container.workspace_id, root_id])
}

pub(super) fn history(
    conn: &Connection,
    container: &Container,
    block_id: &str,
) -> StoreResult<Vec<Block>> {
    let sql = format!(
        "SELECT {BLOCK_COLUMNS} FROM blocks
         WHERE container_id = ?1 AND id = ?2
         ORDER BY insert_at ASC"
    );
    query_blocks(conn, &sql, params![container.workspace_id, block_id])
}

/// Live children of any of `parent_ids`.
fn children_of(
    conn: &Connection,
    container: &Container,
    parent_ids: &[String],
) -> StoreResult<Vec<Block>> {
    let mut children = Vec::new();
    for chunk in parent_ids.chunks(MAX_IN_PARAMS) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks_current
             WHERE container_id = ? AND delete_at = 0 AND parent_id IN ({placeholders})"
        );
        let bound = std::iter::once(container.workspace_id.as_str())
            .chain(chunk.iter().map(String::as_str));
        children.extend(query_blocks(conn, &sql, params_from_iter(bound))?);
    }
    Ok(children)
}

pub(super) fn sub_tree(
    conn: &Connection,
    container: &Container,
    block_id: &str,
    depth: usize,
) -> StoreResult<Vec<Block>> {
    let Some(top) = live(conn, container, block_id)? else {
        return Ok(Vec::new());
    };

    let mut seen = HashSet::from([top.id.clone()]);
    let mut frontier = vec![top.id.clone()];
    let mut tree = vec![top];

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for child in children_of(conn, container, &frontier)? {
            if seen.insert(child.id.clone()) {
                next.push(child.id.clone());
                tree.push(child);
            }
        }
        frontier = next;
    }

    Ok(tree)
}
