use rusqlite::{params, OptionalExtension};

use super::*;

impl LeadDb {
    // =========================================================================
    // Agent sales counters
    // =========================================================================

    /// Bump an agent's sales counter, creating the row on first sale.
    /// Only called from inside the lead upsert transaction.
    pub(crate) fn increment_agent_sales(&self, agent: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO agent_sales (agent, sales_count) VALUES (?1, 1)
             ON CONFLICT(agent) DO UPDATE SET sales_count = agent_sales.sales_count + 1",
            params![agent],
        )?;
        Ok(())
    }

    /// Sales recorded for one agent; 0 for agents with no row.
    pub fn get_agent_sales(&self, agent: &str) -> Result<i64, DbError> {
        let count = self
            .conn
            .query_row(
                "SELECT sales_count FROM agent_sales WHERE agent = ?1",
                params![agent],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// All sales counters, highest first, ties by agent name.
    pub fn list_agent_sales(&self) -> Result<Vec<DbAgentSales>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT agent, sales_count FROM agent_sales
             ORDER BY sales_count DESC, agent ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DbAgentSales {
                agent: row.get(0)?,
                sales_count: row.get(1)?,
            })
        })?;
        let mut sales = Vec::new();
        for row in rows {
            sales.push(row?);
        }
        Ok(sales)
    }
}
