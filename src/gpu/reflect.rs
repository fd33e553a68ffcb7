use super::ProgramSource;
use crate::error::CoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EntryPoint {
    pub name: String,
    pub workgroup_size: [u32; 3],
}

/// Lists the compute entry points a WGSL program declares, with their
/// `@workgroup_size`.
pub(crate) fn compute_entry_points(source: &ProgramSource) -> Result<Vec<EntryPoint>, CoreError> {
    let module = naga::front::wgsl::parse_str(source.wgsl).map_err(|e| CoreError::ShaderParse {
        program: source.label,
        message: e.emit_to_string(source.wgsl),
    })?;
    Ok(module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Compute)
        .map(|ep| EntryPoint {
            name: ep.name.clone(),
            workgroup_size: ep.workgroup_size,
        })
        .collect())
}
