//! Email engagement aggregates.

use serde::Serialize;

use coachdeck_api::EmailMetric;

use super::rate;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngagementSummary {
    pub campaigns: usize,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub unsubscribed: u64,
    /// delivered / sent
    pub delivery_rate: f64,
    /// opened / delivered
    pub open_rate: f64,
    /// clicked / delivered
    pub click_rate: f64,
    /// bounced / sent
    pub bounce_rate: f64,
    /// unsubscribed / delivered
    pub unsubscribe_rate: f64,
    /// 0 to 100
    pub score: f64,
}

impl EngagementSummary {
    pub fn from_metrics(metrics: &[EmailMetric]) -> Self {
        let mut summary = EngagementSummary {
            campaigns: metrics.len(),
            ..Default::default()
        };
        for m in metrics {
            summary.sent = summary.sent.saturating_add(m.sent);
            summary.delivered = summary.delivered.saturating_add(m.delivered);
            summary.opened = summary.opened.saturating_add(m.opened);
            summary.clicked = summary.clicked.saturating_add(m.clicked);
            summary.bounced = summary.bounced.saturating_add(m.bounced);
            summary.unsubscribed = summary.unsubscribed.saturating_add(m.unsubscribed);
        }
        summary.fill_rates();
        summary
    }

    fn fill_rates(&mut self) {
        self.delivery_rate = rate(self.delivered, self.sent);
        self.open_rate = rate(self.opened, self.delivered);
        self.click_rate = rate(self.clicked, self.delivered);
        self.bounce_rate = rate(self.bounced, self.sent);
        self.unsubscribe_rate = rate(self.unsubscribed, self.delivered);
        self.score = engagement_score(
            self.open_rate,
            self.click_rate,
            self.bounce_rate,
            self.unsubscribe_rate,
        );
    }
}

/// Weighted engagement score on a 0..=100 scale.
pub fn engagement_score(open: f64, click: f64, bounce: f64, unsubscribe: f64) -> f64 {
    let raw = 0.5 * open + 0.4 * click - 0.3 * bounce - 0.2 * unsubscribe;
    raw.clamp(0.0, 1.0) * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignEngagement {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub summary: EngagementSummary,
}

/// Per-campaign summaries, best score first, ties by campaign id.
pub fn campaign_ranking(metrics: &[EmailMetric]) -> Vec<CampaignEngagement> {
    let mut by_campaign: Vec<(String, Option<String>, Vec<EmailMetric>)> = Vec::new();
    for metric in metrics {
        match by_campaign
            .iter_mut()
            .find(|(id, _, _)| *id == metric.campaign_id)
        {
            Some((_, name, rows)) => {
                if name.is_none() {
                    name.clone_from(&metric.campaign_name);
                }
                rows.push(metric.clone());
            }
            None => by_campaign.push((
                metric.campaign_id.clone(),
                metric.campaign_name.clone(),
                vec![metric.clone()],
            )),
        }
    }

    let mut ranking: Vec<CampaignEngagement> = by_campaign
        .into_iter()
        .map(|(campaign_id, campaign_name, rows)| CampaignEngagement {
            campaign_id,
            campaign_name,
            summary: EngagementSummary::from_metrics(&rows),
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.summary
            .score
            .total_cmp(&a.summary.score)
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
    });
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metric(campaign: &str, sent: u64, delivered: u64, opened: u64, clicked: u64) -> EmailMetric {
        EmailMetric {
            id: format!("{campaign}-{sent}"),
            user_id: "u1".to_string(),
            campaign_id: campaign.to_string(),
            campaign_name: None,
            sent,
            delivered,
            opened,
            clicked,
            bounced: sent - delivered,
            unsubscribed: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_metrics_have_zero_rates() {
        let summary = EngagementSummary::from_metrics(&[]);
        assert_eq!(summary.campaigns, 0);
        assert_eq!(summary.open_rate, 0.0);
        assert_eq!(summary.score, 0.0);
        assert!(summary.score.is_finite());
    }

    #[test]
    fn test_huge_totals_saturate() {
        let mut big = metric("a", u64::MAX, u64::MAX, 0, 0);
        big.unsubscribed = u64::MAX;
        let summary = EngagementSummary::from_metrics(&[big.clone(), big]);
        assert_eq!(summary.sent, u64::MAX);
        assert_eq!(summary.unsubscribed, u64::MAX);
        assert!(summary.score.is_finite());
    }

    #[test]
    fn test_summary_totals_and_rates() {
        let summary = EngagementSummary::from_metrics(&[
            metric("a", 100, 90, 45, 9),
            metric("b", 100, 90, 45, 9),
        ]);
        assert_eq!(summary.sent, 200);
        assert_eq!(summary.delivered, 180);
        assert!((summary.open_rate - 0.5).abs() < 1e-9);
        assert!((summary.click_rate - 0.1).abs() < 1e-9);
        assert!((summary.bounce_rate - 0.1).abs() < 1e-9);
        // 0.25 + 0.04 - 0.03 = 0.26
        assert!((summary.score - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(engagement_score(0.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(engagement_score(1.0, 1.0, 0.0, 0.0), 100.0);
    }

    #[test]
    fn test_campaign_ranking_orders_by_score_then_id() {
        let ranking = campaign_ranking(&[
            metric("b", 10, 10, 5, 0),
            metric("a", 10, 10, 5, 0),
            metric("c", 10, 10, 9, 5),
            metric("a", 10, 10, 5, 0),
        ]);
        let ids: Vec<&str> = ranking.iter().map(|c| c.campaign_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(ranking[1].summary.sent, 20);
    }
}
