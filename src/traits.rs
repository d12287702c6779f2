use async_trait::async_trait;
use crate::error::Result;
use crate::types::MeasurementResult;

/// ResultSource: 所有测速来源必须实现的接口
#[async_trait]
pub trait ResultSource: Sync + Send {
    /// 来源名称 (如 "cloudflare")
    fn name(&self) -> &'static str;

    /// 执行一次完整测速
    /// 可能耗时数秒; 任何失败都以 Err 返回, 由调用方决定是否写库
    async fn run(&self) -> Result<MeasurementResult>;
}
