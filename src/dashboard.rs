use crate::event::{ActionTaken, ModerationEvent};
use chrono::DateTime;
use std::collections::HashSet;
use std::path::Path;

const MAX_ROW_CONTENT_CHARS: usize = 300;

/// Escapes user-supplied text before it is embedded in the document.
/// Unescaped content would be a script-injection vector once the dashboard
/// is opened in a browser.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn display_time(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// Renders the complete dashboard document from the stored event history.
/// Pure function of the events: same input, same output, no embedded "now".
pub fn render(events: &[ModerationEvent]) -> String {
    // Newest first; the sort is stable so equal timestamps keep append order.
    let mut ordered: Vec<&ModerationEvent> = events.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let flagged = events
        .iter()
        .filter(|e| e.action == ActionTaken::Flagged)
        .count();
    let deleted = events
        .iter()
        .filter(|e| e.action == ActionTaken::Deleted)
        .count();
    let distinct_users = events.iter().map(|e| e.user_id).collect::<HashSet<_>>().len();

    let mut rows = String::new();
    for event in &ordered {
        let row_class = event.action.to_string();
        let percent = event.confidence * 100.0;
        rows.push_str(&format!(
            r#"                        <tr class="{row_class}">
                            <td>{time}</td>
                            <td><span class="badge {row_class}">{action}</span></td>
                            <td><strong>{user}</strong><br><small>ID: {user_id}</small></td>
                            <td><span class="label-pill">{label}</span></td>
                            <td><div class="confidence">
                                <div class="confidence-bar" style="width: {percent:.1}%"></div>
                                <span>{percent:.1}%</span>
                            </div></td>
                            <td class="message">{content}</td>
                            <td>{channel}</td>
                        </tr>
"#,
            row_class = row_class,
            time = display_time(&event.timestamp),
            action = event.action.to_string().to_uppercase(),
            user = escape_html(&event.user),
            user_id = event.user_id,
            label = escape_html(&event.label),
            percent = percent,
            content = escape_html(&truncate(&event.content, MAX_ROW_CONTENT_CHARS)),
            channel = escape_html(&event.channel),
        ));
    }

    let mut document = String::with_capacity(TEMPLATE_HEAD.len() + TEMPLATE_TAIL.len() + rows.len());
    document.push_str(TEMPLATE_HEAD);
    document.push_str(&format!(
        r#"            <div class="stats">
                <div class="stat-card">
                    <div class="stat-value" id="total-flagged">{flagged}</div>
                    <div class="stat-label">Total Flagged</div>
                </div>
                <div class="stat-card">
                    <div class="stat-value" id="total-deleted">{deleted}</div>
                    <div class="stat-label">Messages Deleted</div>
                </div>
                <div class="stat-card">
                    <div class="stat-value" id="total-users">{distinct_users}</div>
                    <div class="stat-label">Unique Users</div>
                </div>
            </div>
"#
    ));
    document.push_str(TEMPLATE_MID);
    document.push_str(&rows);
    document.push_str(TEMPLATE_TAIL);
    document
}

/// Renders and writes the dashboard next to the event history document.
pub fn write_to(path: &Path, events: &[ModerationEvent]) -> anyhow::Result<()> {
    std::fs::write(path, render(events))?;
    Ok(())
}

const TEMPLATE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Prism Moderation Dashboard</title>
    <style>
        :root {
            --primary: #4f46e5;
            --danger: #ef4444;
            --warning: #f59e0b;
            --bg: #f8fafc;
            --card-bg: #ffffff;
            --text: #1e293b;
            --text-muted: #64748b;
            --border: #e2e8f0;
        }

        * { box-sizing: border-box; margin: 0; padding: 0; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
            background-color: var(--bg);
            color: var(--text);
            line-height: 1.5;
            padding: 2rem 1rem;
        }

        .container { max-width: 1400px; margin: 0 auto; }

        header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            margin-bottom: 2rem;
            flex-wrap: wrap;
            gap: 1rem;
        }

        h1 { font-size: 1.75rem; font-weight: 700; }

        .stats { display: flex; gap: 1rem; flex-wrap: wrap; }

        .stat-card {
            background: var(--card-bg);
            border-radius: 0.5rem;
            padding: 1rem 1.5rem;
            box-shadow: 0 1px 3px rgba(0,0,0,0.05);
            min-width: 180px;
        }

        .stat-value { font-size: 1.5rem; font-weight: 700; margin-bottom: 0.25rem; }
        .stat-label { font-size: 0.875rem; color: var(--text-muted); }

        .dashboard {
            background: var(--card-bg);
            border-radius: 0.75rem;
            box-shadow: 0 4px 6px -1px rgba(0, 0, 0, 0.1);
            overflow: hidden;
        }

        .filters {
            padding: 1rem 1.5rem;
            border-bottom: 1px solid var(--border);
            display: flex;
            gap: 1rem;
            flex-wrap: wrap;
            align-items: center;
        }

        .filter-group { display: flex; align-items: center; gap: 0.5rem; }

        label { font-size: 0.875rem; font-weight: 500; color: var(--text-muted); }

        select, input[type="text"] {
            padding: 0.5rem 0.75rem;
            border: 1px solid var(--border);
            border-radius: 0.375rem;
            font-family: inherit;
            font-size: 0.875rem;
        }

        table { width: 100%; border-collapse: collapse; font-size: 0.875rem; }

        th {
            background-color: #f8fafc;
            color: var(--text-muted);
            font-weight: 600;
            text-align: left;
            padding: 1rem 1.5rem;
            border-bottom: 1px solid var(--border);
            text-transform: uppercase;
            font-size: 0.75rem;
            letter-spacing: 0.05em;
        }

        td {
            padding: 1rem 1.5rem;
            border-bottom: 1px solid var(--border);
            vertical-align: top;
        }

        tr:last-child td { border-bottom: none; }
        tr.deleted { background-color: #fef2f2; }
        tr.flagged { background-color: #fffbeb; }
        tr:hover { background-color: #f8fafc; }

        .badge {
            display: inline-flex;
            align-items: center;
            padding: 0.25rem 0.5rem;
            border-radius: 0.25rem;
            font-size: 0.75rem;
            font-weight: 600;
            text-transform: uppercase;
            letter-spacing: 0.05em;
        }

        .badge.flagged { background-color: #fef3c7; color: #92400e; }
        .badge.deleted { background-color: #fee2e2; color: #991b1b; }

        .confidence {
            position: relative;
            height: 24px;
            background-color: #e2e8f0;
            border-radius: 0.25rem;
            overflow: hidden;
        }

        .confidence-bar {
            height: 100%;
            background-color: var(--primary);
            min-width: 2px;
        }

        .confidence span {
            position: absolute;
            top: 0; left: 0; right: 0; bottom: 0;
            display: flex;
            align-items: center;
            justify-content: center;
            font-size: 0.75rem;
            font-weight: 600;
            color: white;
            text-shadow: 0 0 2px rgba(0,0,0,0.3);
        }

        .message {
            max-width: 300px;
            white-space: nowrap;
            overflow: hidden;
            text-overflow: ellipsis;
        }

        .label-pill {
            display: inline-block;
            padding: 0.25rem 0.5rem;
            border-radius: 9999px;
            background-color: #e0f2fe;
            color: #0369a1;
            font-size: 0.75rem;
            font-weight: 500;
        }

        .empty-state {
            padding: 3rem 1.5rem;
            text-align: center;
            color: var(--text-muted);
        }
    </style>
</head>
<body>
    <div class="container">
        <header>
            <div>
                <h1>Prism Moderation Dashboard</h1>
                <p>Flagged and moderated content, newest first</p>
            </div>
"#;

const TEMPLATE_MID: &str = r#"        </header>

        <div class="dashboard">
            <div class="filters">
                <div class="filter-group">
                    <label for="filter-action">Action:</label>
                    <select id="filter-action">
                        <option value="">All Actions</option>
                        <option value="flagged">Flagged</option>
                        <option value="deleted">Deleted</option>
                    </select>
                </div>
                <div class="filter-group">
                    <label for="filter-user">User:</label>
                    <input type="text" id="filter-user" placeholder="Filter by username">
                </div>
                <div class="filter-group">
                    <label for="filter-content">Message:</label>
                    <input type="text" id="filter-content" placeholder="Search in messages">
                </div>
            </div>

            <div style="overflow-x: auto;">
                <table id="moderation-table">
                    <thead>
                        <tr>
                            <th>Timestamp</th>
                            <th>Action</th>
                            <th>User</th>
                            <th>Category</th>
                            <th>Confidence</th>
                            <th>Message</th>
                            <th>Channel</th>
                        </tr>
                    </thead>
                    <tbody>
"#;

const TEMPLATE_TAIL: &str = r#"                    </tbody>
                </table>
            </div>

            <div id="empty-state" class="empty-state" style="display: none;">
                <p>No moderation events found matching your filters.</p>
            </div>
        </div>
    </div>

    <script>
        async function loadData() {
            try {
                const response = await fetch('events.json');
                const data = await response.json();
                return data.events || [];
            } catch (error) {
                console.error('Error loading data:', error);
                return [];
            }
        }

        async function updateDashboard() {
            const events = await loadData();
            if (!events.length) {
                return; // keep the server-rendered table
            }
            const actionFilter = document.getElementById('filter-action').value.toLowerCase();
            const userFilter = document.getElementById('filter-user').value.toLowerCase();
            const contentFilter = document.getElementById('filter-content').value.toLowerCase();

            const filteredEvents = events.filter(event => {
                const matchesAction = !actionFilter || event.action.toLowerCase() === actionFilter;
                const matchesUser = !userFilter || event.user.toLowerCase().includes(userFilter);
                const matchesContent = !contentFilter ||
                    (event.content && event.content.toLowerCase().includes(contentFilter));
                return matchesAction && matchesUser && matchesContent;
            });

            updateStats(events);
            renderTable(filteredEvents);
        }

        function updateStats(events) {
            const flaggedCount = events.filter(e => e.action === 'flagged').length;
            const deletedCount = events.filter(e => e.action === 'deleted').length;
            const uniqueUsers = new Set(events.map(e => e.user_id)).size;

            document.getElementById('total-flagged').textContent = flaggedCount;
            document.getElementById('total-deleted').textContent = deletedCount;
            document.getElementById('total-users').textContent = uniqueUsers;
        }

        function renderTable(events) {
            const tbody = document.querySelector('#moderation-table tbody');
            const emptyState = document.getElementById('empty-state');

            if (!events.length) {
                tbody.innerHTML = '';
                emptyState.style.display = 'block';
                return;
            }

            emptyState.style.display = 'none';

            const sorted = events.slice().sort((a, b) => b.timestamp.localeCompare(a.timestamp));
            const rows = sorted.map(event => {
                const date = new Date(event.timestamp);
                const formattedDate = isNaN(date) ? event.timestamp : date.toLocaleString();
                const percent = (event.confidence * 100).toFixed(1) + '%';

                return `
                    <tr class="${event.action}">
                        <td>${formattedDate}</td>
                        <td><span class="badge ${event.action}">${event.action.toUpperCase()}</span></td>
                        <td><strong>${escapeHtml(event.user)}</strong><br><small>ID: ${event.user_id}</small></td>
                        <td><span class="label-pill">${escapeHtml(event.label)}</span></td>
                        <td>
                            <div class="confidence">
                                <div class="confidence-bar" style="width: ${event.confidence * 100}%"></div>
                                <span>${percent}</span>
                            </div>
                        </td>
                        <td class="message" title="${escapeHtml(event.content)}">${escapeHtml(truncate(event.content, 50))}</td>
                        <td>${escapeHtml(event.channel)}</td>
                    </tr>
                `;
            }).join('');

            tbody.innerHTML = rows;
        }

        function escapeHtml(unsafe) {
            if (!unsafe) return '';
            return String(unsafe)
                .replace(/&/g, "&amp;")
                .replace(/</g, "&lt;")
                .replace(/>/g, "&gt;")
                .replace(/"/g, "&quot;")
                .replace(/'/g, "&#039;");
        }

        function truncate(str, length) {
            if (!str) return '';
            return str.length > length ? str.substring(0, length) + '...' : str;
        }

        document.addEventListener('DOMContentLoaded', () => {
            updateDashboard();

            document.getElementById('filter-action').addEventListener('change', updateDashboard);
            document.getElementById('filter-user').addEventListener('input', updateDashboard);
            document.getElementById('filter-content').addEventListener('input', updateDashboard);

            setInterval(updateDashboard, 30000);
        });
    </script>
</body>
</html>
"#;
