//! Application constants
//!
//! Single source of truth for paths, endpoints and loop defaults.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/chat.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/sse";

pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_MAX_ROUNDS: usize = 25;

pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_CALL_ATTEMPTS: u32 = 3;
pub const DEFAULT_CALL_BACKOFF_MS: u64 = 1_000;

/// Upper bound on waiting for the SSE `endpoint` event.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Store setting keys.
pub const SETTING_MODEL: &str = "model";
pub const SETTING_SYSTEM_PROMPT: &str = "system_prompt";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant for meteorologists and forecasters. You have access to the Sheerwater \
benchmarking platform through various tools.

Your capabilities include:
1. **Forecast evaluation**: Compare forecast models against ground truth using metrics (MAE, RMSE, bias, etc.)
2. **Data discovery**: List available forecast models, metrics, and ground truth datasets
3. **Visualization**: Create ANY chart, map, or plot using `tool_render_plotly`

## Visualization (IMPORTANT)

You have full Plotly flexibility via `tool_render_plotly`. When a user asks you to create a chart, \
map, or visualization of ANY kind, use this tool. Do not refuse visualization requests. Construct \
the best Plotly figure specification you can. You can create bar charts, line charts, scatter plots, \
choropleth maps, geographic scatter maps, heatmaps, and anything else Plotly supports.

If you need data to populate a visualization, use the evaluation tools to fetch it first, \
then pass the results to `tool_render_plotly`. If the user provides their own data, use it directly.

Be concise and helpful. When presenting data, format it clearly.";
