//! Модуль для отслеживания прогресса выполнения конвейера
//!
//! Наблюдатели получают уведомления при смене этапа и при обновлении
//! прогресса внутри этапа (например, после каждого синтезированного фрагмента).

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: ProcessStep,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения всей операции (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация о текущем этапе
    pub details: Option<String>,
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    /// Метод, вызываемый при обновлении прогресса
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Этапы конвейера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStep {
    /// Разбор размеченного диалога
    DialogueParsing,
    /// Синтез речи и сборка дорожек
    SpeechSynthesis,
    /// Микширование дорожек
    TrackMixing,
    /// Запись WAV-файлов
    AudioExport,
    /// Построение таймлайнов губ
    VisemeReduction,
    /// Передача в рендер
    Rendering,
}

impl ProcessStep {
    const ALL: [ProcessStep; 6] = [
        Self::DialogueParsing,
        Self::SpeechSynthesis,
        Self::TrackMixing,
        Self::AudioExport,
        Self::VisemeReduction,
        Self::Rendering,
    ];

    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DialogueParsing => "dialogue parsing",
            Self::SpeechSynthesis => "speech synthesis",
            Self::TrackMixing => "track mixing",
            Self::AudioExport => "audio export",
            Self::VisemeReduction => "viseme reduction",
            Self::Rendering => "rendering",
        }
    }

    /// Получить весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::DialogueParsing => 2.0,
            Self::SpeechSynthesis => 70.0,
            Self::TrackMixing => 5.0,
            Self::AudioExport => 5.0,
            Self::VisemeReduction => 3.0,
            Self::Rendering => 15.0,
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct TrackerState {
    current_step: ProcessStep,
    step_progress: f32,
    completed: [bool; 6],
}

/// Трекер прогресса для отслеживания выполнения конвейера
pub struct ProgressTracker {
    observers: Vec<Box<dyn ProgressObserver>>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Создать новый экземпляр ProgressTracker
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            state: Mutex::new(TrackerState {
                current_step: ProcessStep::DialogueParsing,
                step_progress: 0.0,
                completed: [false; 6],
            }),
        }
    }

    /// Добавить наблюдателя
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        self.observers.push(observer);
        self.observers.len() - 1
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Установить текущий этап
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut state = self.lock();
            if state.current_step == step {
                return;
            }
            // Предыдущий этап считаем завершенным
            let previous = state.current_step.index();
            state.completed[previous] = true;
            state.current_step = step;
            state.step_progress = 0.0;
        }
        self.report(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        self.lock().step_progress = progress.clamp(0.0, 100.0);
        self.report(details);
    }

    /// Отметить завершение всего процесса
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            state.completed = [true; 6];
            state.step_progress = 100.0;
        }
        self.report(Some("done".to_string()));
    }

    fn total_progress(state: &TrackerState) -> f32 {
        let total_weight: f32 = ProcessStep::ALL.iter().map(|s| s.weight()).sum();
        let mut done = 0.0;
        for step in ProcessStep::ALL {
            if state.completed[step.index()] {
                done += step.weight();
            } else if step == state.current_step {
                done += step.weight() * state.step_progress / 100.0;
            }
        }
        (done / total_weight * 100.0).clamp(0.0, 100.0)
    }

    fn report(&self, details: Option<String>) {
        if self.observers.is_empty() {
            return;
        }
        let info = {
            let state = self.lock();
            ProgressInfo {
                step: state.current_step,
                step_progress: state.step_progress,
                total_progress: Self::total_progress(&state),
                details,
            }
        };
        for observer in &self.observers {
            observer.on_progress_update(info.clone());
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
