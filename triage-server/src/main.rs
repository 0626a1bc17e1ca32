//! 分诊服务器主程序
//!
//! 加载运行时配置，预生成排班日历，并运行一组示例就诊请求，
//! 展示自动预约、人工队列、升级与护士处理的完整流程。

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use triage_core::{
    DepartmentScore, IntakeRequest, NurseAction, Result, Sex, TriageConfig, TriageResult,
    Urgency,
};
use triage_integration::WebhookNotifier;
use triage_workflow::{MemoryAuditLog, NoopNotifier, Notifier, TriageEngine};

/// 分诊服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage-server")]
#[command(about = "临床分诊路由与调度服务器")]
struct Args {
    /// 自动预约的最低分类置信度
    #[arg(long)]
    confidence_threshold: Option<f64>,

    /// 日历预生成天数
    #[arg(long)]
    seed_days: Option<i64>,

    /// 通知Webhook地址
    #[arg(long)]
    webhook_url: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    info!("启动分诊服务器...");

    // 加载配置：环境变量优先，命令行参数覆盖
    let mut config = TriageConfig::from_env();
    if let Some(threshold) = args.confidence_threshold {
        config.auto_book_confidence_threshold = threshold;
    }
    if let Some(days) = args.seed_days {
        config.seed_days = days;
    }
    if let Some(url) = args.webhook_url {
        config.notification_webhook_url = url;
    }

    info!("分诊服务器配置:");
    info!("  置信度阈值: {}", config.auto_book_confidence_threshold);
    info!("  科室分阈值: {}", config.department_score_threshold);
    info!("  抢占: {}", config.preemption_enabled);
    info!("  日历预生成天数: {}", config.seed_days);

    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(&config) {
        Some(webhook) => {
            info!("  通知: webhook ({} 个端点)", webhook.endpoint_count());
            Arc::new(webhook)
        }
        None => {
            info!("  通知: 未配置Webhook，使用空实现");
            Arc::new(NoopNotifier)
        }
    };

    let audit = Arc::new(MemoryAuditLog::new());
    let engine = TriageEngine::new(config.clone(), audit.clone(), notifier);

    let seeded = seed_calendar(&engine, &config).await;
    info!("排班日历预生成完成: {} 个时段", seeded);

    run_demo_intakes(&engine).await?;

    let metrics = engine.metrics().await;
    println!("\n📊 运营概览:");
    println!("   待人工处理: {}", metrics.pending_review);
    println!("   已预约: {}", metrics.booked);
    println!("   被抢占: {}", metrics.preempted);
    println!("   已取消: {}", metrics.cancelled);
    println!("   空闲时段: {}/{}", metrics.free_slots, metrics.total_slots);
    println!("   审计条目: {}", audit.len());

    Ok(())
}

/// 按配置的科室与出诊医生预生成排班日历
///
/// 每位医生每天上午和下午各一个时段。
async fn seed_calendar(engine: &TriageEngine, config: &TriageConfig) -> usize {
    let base = chrono::Utc::now();
    let mut count = 0;

    for day in 1..=config.seed_days {
        for (department, providers) in &config.department_providers {
            for provider in providers {
                for hour in [9, 14] {
                    let start = base + chrono::Duration::days(day) + chrono::Duration::hours(hour);
                    let end = start + chrono::Duration::minutes(30);
                    engine
                        .scheduler()
                        .add_slot(department.clone(), provider.clone(), start, end)
                        .await;
                    count += 1;
                }
            }
        }
    }

    count
}

/// 运行示例就诊请求，覆盖所有路由动作
async fn run_demo_intakes(engine: &TriageEngine) -> Result<()> {
    println!("🚀 分诊引擎演示\n");

    let cases = sample_cases();
    for (label, request, triage) in cases {
        println!("📋 处理就诊请求: {}", label);
        let outcome = engine.process_intake(request, triage).await?;
        println!(
            "   决策: {} ({})",
            outcome.routing_decision.action, outcome.routing_decision.reason
        );
        if let Some(result) = &outcome.appointment_result {
            println!("   预约状态: {:?} {}", result.status, result.note);
        }
        if let Some(queue_id) = outcome.queue_id {
            println!("   队列项: {}", queue_id);
        }
    }

    // 护士处理队列中优先级最高的一项
    let pending = engine.pending_queue().await;
    if let Some(top) = pending.first() {
        println!("\n👩‍⚕️ 护士处理队列项 {} (优先级 {})", top.id, top.priority);
        let result = engine
            .resolve_queue_item(
                top.id,
                NurseAction {
                    nurse_name: "Nurse Alvarez".to_string(),
                    department_override: None,
                    urgency_override: None,
                    note: "Reviewed intake notes.".to_string(),
                    decline: false,
                },
            )
            .await?;
        println!("   处理结果: {:?} {}", result.status, result.note);
    } else {
        warn!("人工队列为空，跳过护士处理演示");
    }

    Ok(())
}

/// 示例病例：自动预约、低置信度入队、低紧急程度入队、
/// 分类器请求人工路由、置信度硬下限升级
fn sample_cases() -> Vec<(&'static str, IntakeRequest, TriageResult)> {
    vec![
        (
            "胸痛（高置信度，自动预约）",
            IntakeRequest {
                phone: Some("555-301-7788".to_string()),
                age: 58,
                sex: Sex::Male,
                symptoms: "Crushing chest pain radiating to the left arm for 40 minutes."
                    .to_string(),
            },
            triage_result(
                Urgency::Emergency,
                0.93,
                "Cardiology",
                0.90,
                vec!["chest pain".to_string(), "radiation to arm".to_string()],
                false,
            ),
        ),
        (
            "腹痛（低置信度，转人工）",
            IntakeRequest {
                phone: Some("555-440-1212".to_string()),
                age: 34,
                sex: Sex::Female,
                symptoms: "Intermittent abdominal pain since yesterday evening.".to_string(),
            },
            triage_result(Urgency::Urgent, 0.61, "Gastroenterology", 0.82, vec![], false),
        ),
        (
            "皮疹（低紧急程度，人工排期）",
            IntakeRequest {
                phone: None,
                age: 25,
                sex: Sex::Female,
                symptoms: "Itchy rash on both forearms for two weeks.".to_string(),
            },
            triage_result(Urgency::Routine, 0.88, "Dermatology", 0.91, vec![], false),
        ),
        (
            "头痛（分类器请求人工路由）",
            IntakeRequest {
                phone: Some("555-112-9034".to_string()),
                age: 47,
                sex: Sex::Other,
                symptoms: "Recurring headaches with occasional blurred vision.".to_string(),
            },
            triage_result(Urgency::Soon, 0.84, "Neurology", 0.86, vec![], true),
        ),
        (
            "呼吸困难（置信度低于硬下限，升级）",
            IntakeRequest {
                phone: Some("555-660-4521".to_string()),
                age: 71,
                sex: Sex::Male,
                symptoms: "Sudden shortness of breath, hard to finish sentences.".to_string(),
            },
            triage_result(
                Urgency::Emergency,
                0.22,
                "Pulmonology",
                0.55,
                vec!["dyspnea at rest".to_string()],
                false,
            ),
        ),
    ]
}

fn triage_result(
    urgency: Urgency,
    confidence: f64,
    department: &str,
    department_score: f64,
    red_flags: Vec<String>,
    human_routing_flag: bool,
) -> TriageResult {
    TriageResult {
        redacted_symptoms: "[REDACTED]".to_string(),
        urgency,
        confidence,
        red_flags,
        department_candidates: vec![DepartmentScore {
            department: department.to_string(),
            score: department_score,
        }],
        suggested_department: department.to_string(),
        rationale: "Classifier demo output.".to_string(),
        recommended_timeframe_minutes: 240,
        human_routing_flag,
    }
}
