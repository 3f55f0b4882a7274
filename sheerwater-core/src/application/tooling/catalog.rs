use crate::domain::types::Tool;
use crate::infrastructure::model::ModelTool;

/// Converts the remote catalog to the model's tool declarations.
pub fn to_model_tools(tools: &[Tool]) -> Vec<ModelTool> {
    tools
        .iter()
        .map(|tool| ModelTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        })
        .collect()
}

/// Name and description pairs for listing.
pub fn summaries(tools: &[Tool]) -> Vec<(String, String)> {
    tools
        .iter()
        .map(|tool| (tool.name.clone(), tool.description.clone()))
        .collect()
}
