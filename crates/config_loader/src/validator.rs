//! 配置校验模块
//!
//! 校验规则：
//! - 派生规则 (`validator`): input_channels / backlog / 队列容量 / 帧上限 > 0
//! - endpoint 地址合法 (network 可解析, local 路径非空)
//! - 至少一个输出通道, 名称唯一
//! - 路由标签唯一且不为 -1, 通道号 < 输出通道数
//! - 分层模式至少两个输出通道 (最后一个保留给内部连接)

use std::collections::HashSet;

use contracts::{ContractError, ReceiverBlueprint, TransportKind, UNSET_DESTINATION};
use validator::Validate;

/// 校验 ReceiverBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    validate_derived(blueprint)?;
    validate_endpoint(blueprint)?;
    validate_outputs(blueprint)?;
    validate_routing(blueprint)?;
    validate_hierarchical(blueprint)?;
    Ok(())
}

/// 派生的字段规则
fn validate_derived(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "blueprint".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// 校验监听端点
fn validate_endpoint(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    let endpoint = &blueprint.receiver.endpoint;
    match endpoint.transport {
        TransportKind::Network => {
            endpoint.socket_addr().map_err(|e| {
                ContractError::config_validation(
                    "receiver.endpoint.address",
                    format!("'{}' is not a socket address: {e}", endpoint.address),
                )
            })?;
        }
        TransportKind::Local => {
            if endpoint.address.trim().is_empty() {
                return Err(ContractError::config_validation(
                    "receiver.endpoint.address",
                    "local socket path cannot be empty",
                ));
            }
        }
    }
    Ok(())
}

/// 校验输出通道
fn validate_outputs(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    if blueprint.outputs.is_empty() {
        return Err(ContractError::config_validation(
            "outputs",
            "at least one output channel is required",
        ));
    }
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.outputs.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("outputs[{}].name", idx),
                "output name cannot be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("outputs[name={}]", sink.name),
                "duplicate output name",
            ));
        }
    }
    Ok(())
}

/// 校验路由表
fn validate_routing(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    let outputs = blueprint.outputs.len();
    let mut seen = HashSet::new();
    for (idx, entry) in blueprint.routing.iter().enumerate() {
        if entry.tag == UNSET_DESTINATION {
            return Err(ContractError::config_validation(
                format!("routing[{}].tag", idx),
                format!("tag {} is reserved for items without destination", UNSET_DESTINATION),
            ));
        }
        if !seen.insert(entry.tag) {
            return Err(ContractError::config_validation(
                format!("routing[tag={}]", entry.tag),
                "duplicate routing tag",
            ));
        }
        if entry.channel >= outputs {
            return Err(ContractError::config_validation(
                format!("routing[{}].channel", idx),
                format!(
                    "channel {} out of range, only {} outputs configured",
                    entry.channel, outputs
                ),
            ));
        }
    }
    Ok(())
}

/// 校验分层模式
fn validate_hierarchical(blueprint: &ReceiverBlueprint) -> Result<(), ContractError> {
    let Some(hierarchical) = &blueprint.hierarchical else {
        return Ok(());
    };
    if blueprint.outputs.len() < 2 {
        return Err(ContractError::config_validation(
            "hierarchical",
            format!(
                "needs at least 2 outputs (last is reserved for internal traffic), got {}",
                blueprint.outputs.len()
            ),
        ));
    }
    if hierarchical.internal_groups.iter().any(|g| g.is_empty()) {
        return Err(ContractError::config_validation(
            "hierarchical.internal_groups",
            "group name cannot be empty",
        ));
    }
    Ok(())
}
