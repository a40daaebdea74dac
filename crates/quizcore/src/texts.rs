//! Bilingual (English / Arabic) message texts and button labels.

use crate::model::{OptionTag, UserStats};

pub const BTN_START_QUIZ: &str = "📝 Start Quiz / بدء الاختبار";
pub const BTN_NEXT: &str = "➡️ Next Question / السؤال التالي";
pub const BTN_REPORT: &str = "🚩 Report / إبلاغ";
pub const BTN_MENU: &str = "🏠 Menu / القائمة";
pub const BTN_END: &str = "⏹ End Session / إنهاء الجلسة";
pub const BTN_STATS: &str = "📊 My Stats / إحصائياتي";
pub const BTN_ABOUT: &str = "ℹ️ About / حول البوت";
pub const BTN_BACK: &str = "↩️ Back / رجوع";
pub const BTN_JOIN_CHANNEL: &str = "📢 Join Channel / الانضمام للقناة";
pub const BTN_CHECK_SUBSCRIPTION: &str = "✅ I joined / تحقق من الاشتراك";
pub const BTN_SHARE_PHONE: &str = "📱 Share phone number / مشاركة رقم الهاتف";

pub const PLEASE_RESTART: &str = "Sorry, something went wrong. Please start again with /start.\n\
عذراً، حدث خطأ. يرجى البدء من جديد عبر /start.";

pub const NO_QUESTIONS: &str = "Sorry, no questions are available right now. Please try again later.\n\
عذراً، لا توجد أسئلة متاحة حالياً. حاول مرة أخرى لاحقاً.";

pub const ALL_DONE: &str = "🎉 You have answered every question we have! New questions are added regularly.\n\
🎉 لقد أجبت على جميع الأسئلة المتاحة! تتم إضافة أسئلة جديدة باستمرار.";

pub const REQUEST_PHONE: &str = "Welcome to the Medical Questions Bot!\n\
مرحباً بك في بوت الأسئلة الطبية!\n\n\
Please share your phone number to continue.\n\
يرجى مشاركة رقم هاتفك للمتابعة.";

pub const CONTACT_NOT_OWN: &str = "Please share your own contact using the button below.\n\
يرجى مشاركة جهة الاتصال الخاصة بك باستخدام الزر أدناه.";

pub const CONTACT_SAVED: &str = "✅ Thank you! Your number has been saved.\n✅ شكراً لك! تم حفظ رقمك.";

pub const USE_BUTTONS: &str = "Please use the buttons below.\nيرجى استخدام الأزرار أدناه.";

pub const MENU: &str = "🏠 Main menu / القائمة الرئيسية";

pub const ABOUT: &str = "ℹ️ Medical Questions Bot\n\
Practice multiple-choice medical questions, one at a time, with explanations.\n\n\
بوت الأسئلة الطبية\n\
تدرّب على أسئلة طبية متعددة الخيارات مع الشرح.";

pub const OPTIONS_HEADER: &str = "Options / الخيارات:";

pub const REPORT_PROMPT: &str = "🚩 What is wrong with this question?\n🚩 ما المشكلة في هذا السؤال؟";

pub const REPORT_THANKS: &str = "🙏 Thank you! Your report has been recorded.\n🙏 شكراً لك! تم تسجيل بلاغك.";

pub const REPORT_NOT_FOUND: &str = "Answer the question first, then report it.\nأجب على السؤال أولاً ثم قم بالإبلاغ.";

pub const REPORT_FAILED: &str = "Sorry, your report could not be saved. Please try again.\n\
عذراً، تعذر حفظ البلاغ. حاول مرة أخرى.";

pub const SUBSCRIPTION_CONFIRMED: &str = "✅ Subscription confirmed, enjoy the quiz!\n✅ تم تأكيد الاشتراك، استمتع بالاختبار!";

pub const STILL_NOT_SUBSCRIBED: &str = "⚠️ You are not subscribed yet.\n⚠️ لم تشترك بعد.";

/// Introduction shown once the user is registered.
pub fn introduction(total_questions: u64) -> String {
    format!(
        "Welcome to the Medical Questions Bot!\n\
         مرحباً بك في بوت الأسئلة الطبية!\n\n\
         📚 Questions available: {total_questions}\n\
         📚 عدد الأسئلة المتاحة: {total_questions}\n\n\
         Press the button below to start answering questions.\n\
         اضغط على الزر أدناه لبدء الإجابة على الأسئلة."
    )
}

pub fn question(prompt: &str, number: u64, total: u64) -> String {
    format!("📝 {number} / {total}\n\nQ: {prompt}\n\n{OPTIONS_HEADER}")
}

pub fn option_button(tag: OptionTag, text: &str) -> String {
    format!("{tag}: {text}")
}

pub fn result(is_correct: bool, correct: OptionTag, correct_text: &str, explanation: Option<&str>) -> String {
    let mut text = if is_correct {
        "✅ Correct answer!\nإجابة صحيحة!\n\n".to_string()
    } else {
        format!("❌ Wrong answer\nإجابة خاطئة\nCorrect answer / الإجابة الصحيحة: {correct}) {correct_text}\n\n")
    };

    match explanation.map(str::trim).filter(|e| !e.is_empty()) {
        Some(explanation) => {
            text.push_str("Explanation / الشرح:\n");
            text.push_str(explanation);
        }
        None => text.push_str("No explanation available / لا يوجد شرح متاح"),
    }
    text
}

pub fn stats(stats: &UserStats) -> String {
    format!(
        "📊 Your statistics / إحصائياتك\n\n\
         Answered / تمت الإجابة: {}\n\
         Correct / صحيحة: {}\n\
         Wrong / خاطئة: {}\n\
         Accuracy / الدقة: {:.1}%\n\
         Remaining / المتبقي: {}",
        stats.answered,
        stats.correct,
        stats.wrong(),
        stats.accuracy(),
        stats.remaining()
    )
}

pub fn session_ended(stats: &UserStats) -> String {
    format!(
        "⏹ Session ended / انتهت الجلسة\n\n\
         Answered / تمت الإجابة: {}\n\
         Correct / صحيحة: {}\n\
         Accuracy / الدقة: {:.1}%",
        stats.answered,
        stats.correct,
        stats.accuracy()
    )
}

pub fn subscription_required(free_questions: u64) -> String {
    format!(
        "🔒 You have used your {free_questions} free questions.\n\
         Join our channel to keep practicing, then press the check button.\n\n\
         🔒 لقد استخدمت {free_questions} أسئلة مجانية.\n\
         انضم إلى قناتنا لمتابعة التدريب، ثم اضغط زر التحقق."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_result_shows_full_correct_option() {
        let text = result(false, OptionTag::C, "Aspirin", Some("Irreversible COX inhibitor"));
        assert!(text.contains("C) Aspirin"));
        assert!(text.contains("Irreversible COX inhibitor"));
    }

    #[test]
    fn test_missing_explanation_placeholder() {
        let text = result(true, OptionTag::A, "x", Some("   "));
        assert!(text.contains("No explanation available"));
        assert!(!text.contains("Correct answer /"));
    }

    #[test]
    fn test_question_progress() {
        assert!(question("Why?", 3, 40).starts_with("📝 3 / 40"));
    }
}
