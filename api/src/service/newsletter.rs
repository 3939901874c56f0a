use actix_web::rt::time::sleep;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use common::{
    entities::newsletter::{
        NewsletterSendLog, NewsletterSubscriber, NewsletterTemplate, SendLogStatus,
        SubscriberSource, TemplateStatus, UnsubscribeReason,
    },
    error::{self, AddCode},
};

use crate::{
    config,
    repositories::newsletter::{SendLogRepository, SubscriberRepository, TemplateRepository},
    service::mail::{strip_tags, Letter, MailerObject},
};

/// Recipients per concurrent batch. Batches are separated by a one second
/// pause to stay under the relay's throttle.
pub const BATCH_SIZE: usize = 10;
const BATCH_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub newsletter_id: ObjectId,
    pub total_subscribers: usize,
    pub sent_count: u32,
    pub failed_count: u32,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// New or re-activated signup, confirmation mail sent.
    ConfirmationSent,
    /// Known but unconfirmed address, confirmation mail sent again.
    ConfirmationResent,
    AlreadySubscribed,
}

#[derive(Clone)]
pub struct NewsletterService {
    subscribers: SubscriberRepository,
    templates: TemplateRepository,
    send_logs: SendLogRepository,
    mailer: MailerObject,
}

impl NewsletterService {
    pub fn new(
        subscribers: SubscriberRepository,
        templates: TemplateRepository,
        send_logs: SendLogRepository,
        mailer: MailerObject,
    ) -> Self {
        Self {
            subscribers,
            templates,
            send_logs,
            mailer,
        }
    }

    fn confirmation_letter(subscriber: &NewsletterSubscriber, token: &str) -> Letter {
        let name = match subscriber.full_name().as_str() {
            "" => String::new(),
            name => format!(" {}", name),
        };
        let confirmation_url = format!(
            "{}/api/newsletter/confirm/{}",
            config::backend_url(),
            token
        );
        let html = include_str!("../../templates/confirmation.html")
            .replace("{name}", &name)
            .replace("{confirmationUrl}", &confirmation_url);
        Letter {
            email: subscriber.email.clone(),
            subject: "Bitte bestätigen Sie Ihre Newsletter-Anmeldung".to_string(),
            text: strip_tags(&html),
            html,
        }
    }

    pub async fn send_confirmation(
        &self,
        subscriber: &mut NewsletterSubscriber,
    ) -> error::Result<()> {
        let token = match &subscriber.confirmation_token {
            Some(token) => token.clone(),
            None => {
                let token = subscriber.regenerate_confirmation_token();
                self.subscribers.update(subscriber).await?;
                token
            }
        };
        self.mailer
            .send(&Self::confirmation_letter(subscriber, &token))
            .await?;
        Ok(())
    }

    pub async fn subscribe(
        &self,
        email: &str,
        first_name: Option<String>,
        last_name: Option<String>,
        source: SubscriberSource,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> error::Result<SubscribeOutcome> {
        if let Some(mut existing) = self.subscribers.find_by_email(email).await? {
            if existing.is_active && existing.is_confirmed {
                return Ok(SubscribeOutcome::AlreadySubscribed);
            }
            if !existing.is_active {
                existing.resubscribe();
                self.subscribers.update(&existing).await?;
                self.send_confirmation(&mut existing).await?;
                return Ok(SubscribeOutcome::ConfirmationSent);
            }
            self.send_confirmation(&mut existing).await?;
            return Ok(SubscribeOutcome::ConfirmationResent);
        }

        let mut subscriber = NewsletterSubscriber::new(email, source);
        subscriber.first_name = first_name;
        subscriber.last_name = last_name;
        subscriber.ip_address = ip;
        subscriber.user_agent = user_agent;
        self.subscribers.create(&subscriber).await?;
        self.send_confirmation(&mut subscriber).await?;
        Ok(SubscribeOutcome::ConfirmationSent)
    }

    /// Confirms the double-opt-in. The token only works once.
    pub async fn confirm(&self, token: &str) -> error::Result<NewsletterSubscriber> {
        let Some(mut subscriber) = self.subscribers.find_by_confirmation_token(token).await? else {
            return Err(anyhow::anyhow!("Ungültiger oder abgelaufener Bestätigungslink").code(400));
        };
        subscriber.confirm();
        self.subscribers.update(&subscriber).await?;
        Ok(subscriber)
    }

    pub async fn unsubscribe(
        &self,
        token: &str,
        reason: UnsubscribeReason,
    ) -> error::Result<NewsletterSubscriber> {
        let Some(mut subscriber) = self.subscribers.find_by_unsubscribe_token(token).await? else {
            return Err(anyhow::anyhow!("Ungültiger Abmeldelink").code(400));
        };
        subscriber.unsubscribe(reason);
        self.subscribers.update(&subscriber).await?;
        Ok(subscriber)
    }

    fn fill_placeholders(
        input: &str,
        subscriber: &NewsletterSubscriber,
        unsubscribe_url: &str,
    ) -> String {
        let full_name = subscriber.full_name();
        let first_name = subscriber
            .first_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Hallo");
        let full_name = if full_name.is_empty() {
            "Hallo"
        } else {
            &full_name
        };
        input
            .replace("{{firstName}}", first_name)
            .replace("{{fullName}}", full_name)
            .replace("{{email}}", &subscriber.email)
            .replace("{{unsubscribeUrl}}", unsubscribe_url)
    }

    fn personalized_letter(
        template: &NewsletterTemplate,
        subscriber: &NewsletterSubscriber,
    ) -> Letter {
        let unsubscribe_url = format!(
            "{}/api/newsletter/unsubscribe/{}",
            config::backend_url(),
            subscriber.unsubscribe_token
        );

        let mut html =
            Self::fill_placeholders(&template.content.html, subscriber, &unsubscribe_url);
        if !html.contains(&unsubscribe_url) {
            let footer = include_str!("../../templates/newsletter_footer.html")
                .replace("{unsubscribeUrl}", &unsubscribe_url);
            html.push_str(&footer);
        }

        let pixel = format!(
            "<img src=\"{}/api/newsletter/track/open/{}/{}\" width=\"1\" height=\"1\" style=\"display:none;\" alt=\"\">",
            config::backend_url(),
            subscriber.id.to_hex(),
            template.id.to_hex()
        );
        match html.rfind("</body>") {
            Some(pos) => html.insert_str(pos, &pixel),
            None => html.push_str(&pixel),
        }

        let mut text =
            Self::fill_placeholders(&template.content.text, subscriber, &unsubscribe_url);
        text.push_str(&format!("\n\nNewsletter abbestellen: {}", unsubscribe_url));

        Letter {
            email: subscriber.email.clone(),
            subject: Self::fill_placeholders(&template.subject, subscriber, &unsubscribe_url),
            html,
            text,
        }
    }

    /// Test send to a single address. Rendered exactly like the real thing
    /// but leaves template status, counters and logs untouched.
    pub async fn send_preview(&self, newsletter_id: ObjectId, email: &str) -> error::Result<()> {
        let Some(template) = self.templates.find(&newsletter_id).await? else {
            return Err(anyhow::anyhow!("Newsletter-Vorlage nicht gefunden").code(404));
        };
        let recipient = NewsletterSubscriber::new(email, SubscriberSource::ManualImport);
        let mut letter = Self::personalized_letter(&template, &recipient);
        letter.subject = format!("[Vorschau] {}", letter.subject);
        self.mailer.send(&letter).await?;
        Ok(())
    }

    /// One recipient: pending log row first, then the transport, then the
    /// promotion to sent. Transport failures bubble up to the caller which
    /// records a failed row instead.
    async fn deliver(
        &self,
        template: &NewsletterTemplate,
        subscriber: &NewsletterSubscriber,
    ) -> error::Result<()> {
        let mut log = NewsletterSendLog::pending(template, subscriber);
        self.send_logs.create(&log).await?;

        let message_id = self
            .mailer
            .send(&Self::personalized_letter(template, subscriber))
            .await?;

        log.status = SendLogStatus::Sent;
        log.sent_at = Some(Utc::now());
        log.provider_message_id = message_id;
        self.send_logs.update(&log).await?;

        let mut subscriber = subscriber.clone();
        subscriber.total_emails_received += 1;
        self.subscribers.update(&subscriber).await?;
        Ok(())
    }

    async fn dispatch(&self, newsletter_id: ObjectId) -> error::Result<DispatchReport> {
        let Some(mut template) = self.templates.find(&newsletter_id).await? else {
            return Err(anyhow::anyhow!("Newsletter-Vorlage nicht gefunden").code(404));
        };
        if template.status == TemplateStatus::Sent {
            return Err(anyhow::anyhow!("Dieser Newsletter wurde bereits versendet").code(400));
        }

        template.status = TemplateStatus::Sending;
        template.updated_at = Utc::now();
        self.templates.update(&template).await?;

        let recipients = self.subscribers.confirmed_active().await?;
        if recipients.is_empty() {
            template.status = TemplateStatus::Failed;
            self.templates.update(&template).await?;
            return Err(anyhow::anyhow!("Keine aktiven Abonnenten vorhanden").code(400));
        }

        let mut sent_count = 0u32;
        let mut failed_count = 0u32;

        for (index, batch) in recipients.chunks(BATCH_SIZE).enumerate() {
            if index > 0 {
                sleep(BATCH_DELAY).await;
            }
            let results = join_all(
                batch
                    .iter()
                    .map(|subscriber| self.deliver(&template, subscriber)),
            )
            .await;

            for (subscriber, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => sent_count += 1,
                    Err(err) => {
                        failed_count += 1;
                        log::error!(
                            "Newsletter {} to {} failed: {}",
                            template.id,
                            subscriber.email,
                            err
                        );
                        let failed =
                            NewsletterSendLog::failed(&template, subscriber, err.to_string());
                        self.send_logs.create(&failed).await?;
                    }
                }
            }
        }

        let sent_at = Utc::now();
        template.status = TemplateStatus::Sent;
        template.sent_at = Some(sent_at);
        template.sent_count = sent_count;
        template.updated_at = sent_at;
        self.templates.update(&template).await?;

        Ok(DispatchReport {
            newsletter_id,
            total_subscribers: recipients.len(),
            sent_count,
            failed_count,
            sent_at,
        })
    }

    /// Sends a newsletter to every confirmed subscriber. Any error after
    /// the dispatch started leaves the template marked failed.
    pub async fn send_newsletter(&self, newsletter_id: ObjectId) -> error::Result<DispatchReport> {
        match self.dispatch(newsletter_id).await {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Ok(Some(mut template)) = self.templates.find(&newsletter_id).await {
                    if template.status == TemplateStatus::Sending {
                        template.status = TemplateStatus::Failed;
                        let _ = self.templates.update(&template).await;
                    }
                }
                Err(err)
            }
        }
    }

    /// Dispatches every scheduled template whose time has come. Failures
    /// of one template do not stop the others.
    pub async fn process_scheduled(&self) -> error::Result<Vec<DispatchReport>> {
        let due = self.templates.scheduled_due(Utc::now()).await?;
        let mut reports = Vec::new();
        for template in due {
            match self.send_newsletter(template.id).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    log::error!("Scheduled newsletter {} failed: {}", template.id, err);
                }
            }
        }
        Ok(reports)
    }

    /// Open pixel hit. The counter moves on every call, the status and the
    /// aggregates only on the first open.
    pub async fn track_open(
        &self,
        subscriber_id: ObjectId,
        newsletter_id: ObjectId,
    ) -> error::Result<()> {
        let Some(mut log) = self.send_logs.find_for(&subscriber_id, &newsletter_id).await? else {
            return Ok(());
        };

        log.open_count += 1;
        let first_open = !matches!(log.status, SendLogStatus::Opened | SendLogStatus::Clicked);
        if first_open {
            log.status = SendLogStatus::Opened;
            log.opened_at = Some(Utc::now());
        }
        self.send_logs.update(&log).await?;

        if first_open {
            if let Some(mut template) = self.templates.find(&newsletter_id).await? {
                template.opened_count += 1;
                self.templates.update(&template).await?;
            }
            if let Some(mut subscriber) = self.subscribers.find(&subscriber_id).await? {
                subscriber.total_emails_opened += 1;
                subscriber.last_opened_at = Some(Utc::now());
                self.subscribers.update(&subscriber).await?;
            }
        }
        Ok(())
    }

    pub async fn track_click(
        &self,
        subscriber_id: ObjectId,
        newsletter_id: ObjectId,
    ) -> error::Result<()> {
        let Some(mut log) = self.send_logs.find_for(&subscriber_id, &newsletter_id).await? else {
            return Ok(());
        };

        log.click_count += 1;
        let first_click = log.first_clicked_at.is_none();
        if first_click {
            log.first_clicked_at = Some(Utc::now());
            log.status = SendLogStatus::Clicked;
        }
        self.send_logs.update(&log).await?;

        if first_click {
            if let Some(mut template) = self.templates.find(&newsletter_id).await? {
                template.clicked_count += 1;
                self.templates.update(&template).await?;
            }
            if let Some(mut subscriber) = self.subscribers.find(&subscriber_id).await? {
                subscriber.total_links_clicked += 1;
                subscriber.last_clicked_at = Some(Utc::now());
                self.subscribers.update(&subscriber).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::{
        entities::newsletter::TemplateContent,
        repository::test_repository::TestRepository,
    };

    use super::*;
    use crate::service::mail::TestMailer;

    fn service() -> (NewsletterService, Arc<TestMailer>) {
        let mailer = Arc::new(TestMailer::new());
        let service = NewsletterService::new(
            SubscriberRepository::new(Arc::new(TestRepository::new())),
            TemplateRepository::new(Arc::new(TestRepository::new())),
            SendLogRepository::new(Arc::new(TestRepository::new())),
            mailer.clone(),
        );
        (service, mailer)
    }

    async fn confirmed_subscriber(service: &NewsletterService, email: &str) -> NewsletterSubscriber {
        let mut subscriber =
            NewsletterSubscriber::new(email, SubscriberSource::NewsletterSignup);
        subscriber.confirm();
        service.subscribers.create(&subscriber).await.unwrap();
        subscriber
    }

    async fn template(service: &NewsletterService) -> NewsletterTemplate {
        let template = NewsletterTemplate::new(
            "August".to_string(),
            "Neues im August".to_string(),
            TemplateContent {
                html: "<html><body><p>{{fullName}}, Neuigkeiten für {{email}}.</p></body></html>"
                    .to_string(),
                text: "{{fullName}}, Neuigkeiten für {{email}}.".to_string(),
                json: None,
            },
            ObjectId::new(),
        );
        service.templates.create(&template).await.unwrap();
        template
    }

    #[actix_web::test]
    async fn dispatch_reaches_every_confirmed_subscriber() {
        let (service, mailer) = service();
        for i in 0..25 {
            confirmed_subscriber(&service, &format!("s{}@example.com", i)).await;
        }
        // Unconfirmed and unsubscribed addresses stay out of the audience.
        let pending = NewsletterSubscriber::new("pending@example.com", SubscriberSource::Api);
        service.subscribers.create(&pending).await.unwrap();
        let mut gone = confirmed_subscriber(&service, "gone@example.com").await;
        gone.unsubscribe(UnsubscribeReason::UserRequest);
        service.subscribers.update(&gone).await.unwrap();

        let template = template(&service).await;
        let report = service.send_newsletter(template.id).await.unwrap();

        assert_eq!(report.total_subscribers, 25);
        assert_eq!(report.sent_count, 25);
        assert_eq!(report.failed_count, 0);
        assert_eq!(mailer.sent_count(), 25);

        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TemplateStatus::Sent);
        assert_eq!(stored.sent_count, 25);
        assert!(stored.sent_at.is_some());

        let logs = service.send_logs.for_template(&template.id).await.unwrap();
        assert_eq!(logs.len(), 25);
        assert!(logs.iter().all(|log| log.status == SendLogStatus::Sent));
        assert!(logs.iter().all(|log| log.provider_message_id.is_some()));
    }

    #[actix_web::test]
    async fn failed_recipient_does_not_stop_the_run() {
        let (service, mailer) = service();
        for i in 0..3 {
            confirmed_subscriber(&service, &format!("s{}@example.com", i)).await;
        }
        mailer.fail_address("s1@example.com");

        let template = template(&service).await;
        let report = service.send_newsletter(template.id).await.unwrap();

        assert_eq!(report.sent_count, 2);
        assert_eq!(report.failed_count, 1);

        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TemplateStatus::Sent);
        assert_eq!(stored.sent_count, 2);

        let logs = service.send_logs.for_template(&template.id).await.unwrap();
        let failed: Vec<_> = logs
            .iter()
            .filter(|log| log.status == SendLogStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].recipient_email, "s1@example.com");
        assert!(failed[0].error_message.is_some());
    }

    #[actix_web::test]
    async fn empty_audience_marks_template_failed_without_logs() {
        let (service, mailer) = service();
        let template = template(&service).await;

        let err = service.send_newsletter(template.id).await.unwrap_err();
        assert_eq!(err.code(), 400);

        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TemplateStatus::Failed);
        assert!(service
            .send_logs
            .for_template(&template.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(mailer.sent_count(), 0);
    }

    #[actix_web::test]
    async fn sent_template_cannot_be_sent_twice() {
        let (service, _mailer) = service();
        confirmed_subscriber(&service, "s@example.com").await;
        let template = template(&service).await;

        service.send_newsletter(template.id).await.unwrap();
        let err = service.send_newsletter(template.id).await.unwrap_err();
        assert_eq!(err.code(), 400);

        // The already sent template keeps its status.
        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TemplateStatus::Sent);
    }

    #[actix_web::test]
    async fn personalization_injects_footer_and_pixel() {
        let (service, mailer) = service();
        let subscriber = confirmed_subscriber(&service, "s@example.com").await;
        let template = template(&service).await;

        service.send_newsletter(template.id).await.unwrap();

        let letters = mailer.letters();
        let html = &letters[0].html;
        // No first name on record, the salutation falls back.
        assert!(html.contains("Hallo, Neuigkeiten für s@example.com."));
        assert!(!html.contains("{{fullName}}"));
        assert!(html.contains(&format!(
            "/api/newsletter/unsubscribe/{}",
            subscriber.unsubscribe_token
        )));
        assert!(html.contains(&format!(
            "/api/newsletter/track/open/{}/{}",
            subscriber.id.to_hex(),
            template.id.to_hex()
        )));
        // The pixel sits inside the body, not after it.
        assert!(html.rfind("</body>").unwrap() > html.find("track/open").unwrap());
    }

    #[actix_web::test]
    async fn open_tracking_counts_every_hit_but_promotes_once() {
        let (service, _mailer) = service();
        let subscriber = confirmed_subscriber(&service, "s@example.com").await;
        let template = template(&service).await;
        service.send_newsletter(template.id).await.unwrap();

        service.track_open(subscriber.id, template.id).await.unwrap();
        service.track_open(subscriber.id, template.id).await.unwrap();
        service.track_open(subscriber.id, template.id).await.unwrap();

        let log = service
            .send_logs
            .find_for(&subscriber.id, &template.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.open_count, 3);
        assert_eq!(log.status, SendLogStatus::Opened);

        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.opened_count, 1);
        let stored = service.subscribers.find(&subscriber.id).await.unwrap().unwrap();
        assert_eq!(stored.total_emails_opened, 1);

        // Unknown pairs are ignored rather than rejected.
        service
            .track_open(ObjectId::new(), template.id)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn click_tracking_upgrades_status_and_counts() {
        let (service, _mailer) = service();
        let subscriber = confirmed_subscriber(&service, "s@example.com").await;
        let template = template(&service).await;
        service.send_newsletter(template.id).await.unwrap();

        service.track_open(subscriber.id, template.id).await.unwrap();
        service.track_click(subscriber.id, template.id).await.unwrap();
        service.track_click(subscriber.id, template.id).await.unwrap();

        let log = service
            .send_logs
            .find_for(&subscriber.id, &template.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, SendLogStatus::Clicked);
        assert_eq!(log.click_count, 2);

        let stored = service.templates.find(&template.id).await.unwrap().unwrap();
        assert_eq!(stored.clicked_count, 1);

        // A later open must not demote the clicked status.
        service.track_open(subscriber.id, template.id).await.unwrap();
        let log = service
            .send_logs
            .find_for(&subscriber.id, &template.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, SendLogStatus::Clicked);
    }

    #[actix_web::test]
    async fn confirmation_token_works_only_once() {
        let (service, mailer) = service();
        service
            .subscribe("neu@example.com", None, None, SubscriberSource::NewsletterSignup, None, None)
            .await
            .unwrap();
        assert_eq!(mailer.sent_count(), 1);

        let subscriber = service
            .subscribers
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .unwrap();
        let token = subscriber.confirmation_token.clone().unwrap();

        let confirmed = service.confirm(&token).await.unwrap();
        assert!(confirmed.is_confirmed);

        let err = service.confirm(&token).await.unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[actix_web::test]
    async fn unsubscribe_and_resubscribe_restart_opt_in() {
        let (service, _mailer) = service();
        let subscriber = confirmed_subscriber(&service, "s@example.com").await;

        let gone = service
            .unsubscribe(&subscriber.unsubscribe_token, UnsubscribeReason::UserRequest)
            .await
            .unwrap();
        assert!(!gone.is_active);
        assert_eq!(gone.unsubscribe_reason, Some(UnsubscribeReason::UserRequest));

        let outcome = service
            .subscribe("s@example.com", None, None, SubscriberSource::NewsletterSignup, None, None)
            .await
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::ConfirmationSent);

        let stored = service
            .subscribers
            .find_by_email("s@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_active);
        assert!(!stored.is_confirmed);
        assert!(stored.confirmation_token.is_some());
    }

    #[actix_web::test]
    async fn scheduled_templates_fire_when_due() {
        let (service, mailer) = service();
        confirmed_subscriber(&service, "s@example.com").await;

        let mut due = template(&service).await;
        due.status = TemplateStatus::Scheduled;
        due.is_scheduled = true;
        due.scheduled_date = Some(Utc::now() - chrono::Duration::minutes(1));
        service.templates.update(&due).await.unwrap();

        let mut future = template(&service).await;
        future.status = TemplateStatus::Scheduled;
        future.is_scheduled = true;
        future.scheduled_date = Some(Utc::now() + chrono::Duration::hours(1));
        service.templates.update(&future).await.unwrap();

        let reports = service.process_scheduled().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].newsletter_id, due.id);
        assert_eq!(mailer.sent_count(), 1);

        let stored = service.templates.find(&future.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TemplateStatus::Scheduled);
    }
}
